//! Configuration for rlsaudit
//!
//! The TOML file is deserialized into a loose shape first and then checked
//! as a whole by [`RawConfig::validate`], so every missing or malformed key
//! is reported in a single error.

use crate::error::{AuditError, Result};
use crate::matchers::Matchers;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SITE_DIR: &str = "/site";
const DEFAULT_BIN_DIR: &str = "/bin";
const DEFAULT_ZIPSCRIPT_CACHE: &str = "/ftp-data/pzs-ng";
const DEFAULT_MASK: &str = "masked";

fn default_delay_ms() -> u64 {
    500
}

fn default_irc_bold() -> bool {
    true
}

/// Validated configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Default announce chain when none is given on the command line.
    pub chain: Option<String>,
    pub site: SiteConfig,
    pub ledger_path: PathBuf,
    /// Absolute path of the staging directory holding pending markers.
    pub pending_dir: PathBuf,
    pub patterns: PatternConfig,
    pub tools: ToolPaths,
    pub announce: AnnounceConfig,
    pub logging: LoggingConfig,
}

/// Site layout; every path here is absolute on the host.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub root: PathBuf,
    pub conf: PathBuf,
    pub log: PathBuf,
    /// Chroot prefix stripped from containing paths to form announce paths.
    pub site_dir: String,
    pub sections: Vec<PathBuf>,
    pub no_sample_paths: Vec<String>,
    pub mask_userinfo_paths: Vec<String>,
    pub nuke_on_inc_paths: Vec<String>,
    pub mask_user: String,
    pub mask_group: String,
}

/// Regex sources for the directory-name predicates.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternConfig {
    pub complete: String,
    pub incomplete: String,
    pub day_bucket: String,
    pub nuke: String,
    pub special: String,
}

#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub bin_dir: PathBuf,
    pub zipscript_cache: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnounceConfig {
    /// Pause after each site-log line so the bot does not collapse lines
    /// sharing a timestamp.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_irc_bold")]
    pub irc_bold: bool,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            irc_bold: default_irc_bold(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub verbose: bool,
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub site: RawSite,
    #[serde(default)]
    pub ledger: RawLedger,
    #[serde(default)]
    pub pending: RawPending,
    #[serde(default)]
    pub patterns: RawPatterns,
    #[serde(default)]
    pub tools: RawTools,
    #[serde(default)]
    pub announce: AnnounceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSite {
    pub root: Option<PathBuf>,
    pub conf: Option<PathBuf>,
    pub log: Option<String>,
    pub site_dir: Option<String>,
    pub sections: Option<Vec<String>>,
    #[serde(default)]
    pub no_sample_paths: Vec<String>,
    #[serde(default)]
    pub mask_userinfo_paths: Vec<String>,
    #[serde(default)]
    pub nuke_on_inc_paths: Vec<String>,
    pub mask_user: Option<String>,
    pub mask_group: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawLedger {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPending {
    pub dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPatterns {
    pub complete: Option<String>,
    pub incomplete: Option<String>,
    pub day_bucket: Option<String>,
    pub nuke: Option<String>,
    pub special: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTools {
    pub bin_dir: Option<String>,
    pub zipscript_cache: Option<String>,
}

/// Resolve a chroot-relative path (`/ftp-data/x`) against the site root.
pub fn under_root(root: &Path, chroot_path: &str) -> PathBuf {
    root.join(chroot_path.trim_start_matches('/'))
}

/// Whether `chain` is an acceptable announce chain identifier.
pub fn is_valid_chain(chain: &str) -> bool {
    !chain.is_empty() && chain.chars().all(|c| c.is_ascii_alphanumeric())
}

fn required<T>(value: Option<T>, key: &str, issues: &mut Vec<String>) -> Option<T> {
    if value.is_none() {
        issues.push(format!("missing required key `{key}`"));
    }
    value
}

impl RawConfig {
    /// Check every field and build the typed configuration.
    pub fn validate(self) -> Result<AuditConfig> {
        let mut issues = Vec::new();

        let root = required(self.site.root, "site.root", &mut issues);
        let conf = required(self.site.conf, "site.conf", &mut issues);
        let log = required(self.site.log, "site.log", &mut issues);
        let sections = required(self.site.sections, "site.sections", &mut issues);
        if matches!(&sections, Some(s) if s.is_empty()) {
            issues.push("`site.sections` must list at least one section".to_string());
        }
        let ledger_path = required(self.ledger.path, "ledger.path", &mut issues);
        let pending_dir = required(self.pending.dir, "pending.dir", &mut issues);

        let patterns = PatternConfig {
            complete: required(self.patterns.complete, "patterns.complete", &mut issues)
                .unwrap_or_default(),
            incomplete: required(self.patterns.incomplete, "patterns.incomplete", &mut issues)
                .unwrap_or_default(),
            day_bucket: required(self.patterns.day_bucket, "patterns.day_bucket", &mut issues)
                .unwrap_or_default(),
            nuke: required(self.patterns.nuke, "patterns.nuke", &mut issues).unwrap_or_default(),
            special: required(self.patterns.special, "patterns.special", &mut issues)
                .unwrap_or_default(),
        };
        if let Err(pattern_issues) = Matchers::compile(&patterns) {
            issues.extend(pattern_issues);
        }

        if matches!(&root, Some(r) if !r.is_absolute()) {
            issues.push("`site.root` must be an absolute path".to_string());
        }

        let (Some(root), Some(conf), Some(log), Some(sections), Some(ledger_path), Some(pending_dir)) =
            (root, conf, log, sections, ledger_path, pending_dir)
        else {
            return Err(AuditError::InvalidConfig(issues));
        };
        if !issues.is_empty() {
            return Err(AuditError::InvalidConfig(issues));
        }

        let bin_dir = self.tools.bin_dir.as_deref().unwrap_or(DEFAULT_BIN_DIR);
        let zipscript_cache = self
            .tools
            .zipscript_cache
            .as_deref()
            .unwrap_or(DEFAULT_ZIPSCRIPT_CACHE);

        Ok(AuditConfig {
            chain: self.chain,
            site: SiteConfig {
                log: under_root(&root, &log),
                sections: sections.iter().map(|s| under_root(&root, s)).collect(),
                conf,
                site_dir: self
                    .site
                    .site_dir
                    .unwrap_or_else(|| DEFAULT_SITE_DIR.to_string()),
                no_sample_paths: self.site.no_sample_paths,
                mask_userinfo_paths: self.site.mask_userinfo_paths,
                nuke_on_inc_paths: self.site.nuke_on_inc_paths,
                mask_user: self.site.mask_user.unwrap_or_else(|| DEFAULT_MASK.to_string()),
                mask_group: self.site.mask_group.unwrap_or_else(|| DEFAULT_MASK.to_string()),
                root: root.clone(),
            },
            ledger_path,
            pending_dir: under_root(&root, &pending_dir),
            patterns,
            tools: ToolPaths {
                bin_dir: under_root(&root, bin_dir),
                zipscript_cache: under_root(&root, zipscript_cache),
            },
            announce: self.announce,
            logging: self.logging,
        })
    }
}

impl AuditConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| AuditError::Config(e.to_string()))?;
        raw.validate()
    }

    /// Announce chain for this run: the command-line value if given,
    /// otherwise the configured default. Only the chain actually used is
    /// checked.
    pub fn resolve_chain(&self, cli_chain: Option<&str>) -> Result<String> {
        let chain = cli_chain
            .or(self.chain.as_deref())
            .unwrap_or_default()
            .to_string();
        if is_valid_chain(&chain) {
            Ok(chain)
        } else {
            Err(AuditError::InvalidChain(chain))
        }
    }
}
