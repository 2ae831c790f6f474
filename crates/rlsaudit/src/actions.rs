//! External site commands: nuker, undupe, rescan and dupelist.

use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Nuke multiplier handed to the nuker for incomplete releases.
pub const NUKE_MULTIPLIER: &str = "3";

/// Side-effecting commands the auditor relies on. Paths are chroot paths
/// (as seen from inside the site, e.g. `/site/tv/Release-GRP`).
pub trait SiteActions {
    fn nuke(&self, chroot_path: &Path, reason: &str) -> Result<()>;
    fn undupe(&self, file_name: &str) -> Result<()>;
    fn rescan(&self, chroot_path: &Path) -> Result<()>;
    /// Raw `dupelist` output.
    fn list_dupes(&self) -> Result<String>;
}

/// Runs the glftpd binaries from `<root>/bin`.
#[derive(Debug, Clone)]
pub struct GlftpdActions {
    root: PathBuf,
    conf: PathBuf,
    bin_dir: PathBuf,
}

impl GlftpdActions {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            root: config.site.root.clone(),
            conf: config.site.conf.clone(),
            bin_dir: config.tools.bin_dir.clone(),
        }
    }

    fn binary(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    fn run(&self, cmd: &mut Command) -> Result<Output> {
        let program = cmd.get_program().to_string_lossy().to_string();
        let output = cmd.stdin(Stdio::null()).output().map_err(|e| AuditError::Action {
            command: program.clone(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Action {
                command: program,
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(output)
    }
}

impl SiteActions for GlftpdActions {
    fn nuke(&self, chroot_path: &Path, reason: &str) -> Result<()> {
        self.run(
            Command::new(self.binary("nuker"))
                .arg("-r")
                .arg(&self.conf)
                .args(["-N", "glftpd", "-n"])
                .arg(format!("{{{}}}", chroot_path.display()))
                .arg(NUKE_MULTIPLIER)
                .arg(reason),
        )?;
        Ok(())
    }

    fn undupe(&self, file_name: &str) -> Result<()> {
        self.run(
            Command::new(self.binary("undupe"))
                .arg("-r")
                .arg(&self.conf)
                .arg("-f")
                .arg(file_name),
        )?;
        Ok(())
    }

    fn rescan(&self, chroot_path: &Path) -> Result<()> {
        self.run(
            Command::new(self.binary("rescan"))
                .arg("--quick")
                .arg(format!("--chroot={}", self.root.display()))
                .arg(format!("--dir={}", chroot_path.display())),
        )?;
        Ok(())
    }

    fn list_dupes(&self) -> Result<String> {
        let output = self.run(&mut Command::new(self.binary("dupelist")))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
