//! A release directory and the paths derived from it.

use crate::config::SiteConfig;
use std::path::{Path, PathBuf};

/// Map a host path under the site root to the path seen inside the chroot.
///
/// Paths outside the root are returned unchanged.
pub fn chroot_path(root: &Path, host_path: &Path) -> PathBuf {
    match host_path.strip_prefix(root) {
        Ok(rel) => Path::new("/").join(rel),
        Err(_) => host_path.to_path_buf(),
    }
}

/// One candidate release. `(name, containing_path)` is the ledger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    /// Absolute host path of the release directory.
    pub path: PathBuf,
    /// Chroot path of the parent directory, e.g. `/site/tv`.
    pub containing_path: String,
    /// `containing_path` without the site directory prefix, e.g. `/tv`.
    pub announce_path: String,
}

impl Release {
    /// `None` when the path has no name or is not valid UTF-8; such a
    /// name cannot be written to the ledger or linked back faithfully.
    pub fn from_path(path: &Path, site: &SiteConfig) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let parent = path.parent()?;
        let containing_path = chroot_path(&site.root, parent).to_str()?.to_string();
        let announce_path = containing_path
            .strip_prefix(site.site_dir.trim_end_matches('/'))
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(containing_path.as_str())
            .to_string();
        Some(Self {
            name,
            path: path.to_path_buf(),
            containing_path,
            announce_path,
        })
    }

    /// Host directory holding the release (and any fix siblings).
    pub fn host_parent(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    /// Host parent path as text, for the substring path lists in the config.
    pub fn host_parent_str(&self) -> String {
        self.host_parent().to_string_lossy().into_owned()
    }

    /// Chroot path of the release directory itself.
    pub fn chroot_path(&self) -> PathBuf {
        Path::new(&self.containing_path).join(&self.name)
    }

    /// Relative link target used for the pending marker, e.g. `../tv/Rel-GRP`.
    pub fn marker_target(&self) -> PathBuf {
        PathBuf::from(format!("..{}/{}", self.announce_path, self.name))
    }

    /// True when the host parent path contains any of `needles`.
    pub fn parent_matches_any(&self, needles: &[String]) -> bool {
        let parent = self.host_parent_str();
        needles.iter().any(|n| parent.contains(n.as_str()))
    }
}
