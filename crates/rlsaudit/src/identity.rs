//! uid/gid → name lookup from the site's `etc/passwd` and `etc/group`.

use crate::error::{AuditError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

/// Parse colon-delimited `name:x:id:...` lines into an id → name map.
pub fn parse_id_file(content: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let mut fields = line.split(':');
        let name = fields.next().unwrap_or_default();
        let id = fields.nth(1).and_then(|f| f.trim().parse::<u32>().ok());
        match id {
            Some(id) if !name.is_empty() => {
                map.insert(id, name.to_string());
            }
            _ if line.trim().is_empty() => {}
            _ => debug!(line, "skipping malformed identity line"),
        }
    }
    map
}

fn read_id_file(path: &Path) -> Result<HashMap<u32, String>> {
    let content = std::fs::read_to_string(path).map_err(|source| AuditError::Identity {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_id_file(&content))
}

impl IdentityMap {
    pub fn new(users: HashMap<u32, String>, groups: HashMap<u32, String>) -> Self {
        Self { users, groups }
    }

    /// Load `<root>/etc/passwd` and `<root>/etc/group`.
    pub fn load(site_root: &Path) -> Result<Self> {
        let etc = site_root.join("etc");
        Ok(Self {
            users: read_id_file(&etc.join("passwd"))?,
            groups: read_id_file(&etc.join("group"))?,
        })
    }

    pub fn user(&self, uid: u32) -> &str {
        self.users.get(&uid).map(String::as_str).unwrap_or(UNKNOWN)
    }

    pub fn group(&self, gid: u32) -> &str {
        self.groups.get(&gid).map(String::as_str).unwrap_or(UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_passwd_lines() {
        let map = parse_id_file(
            "glftpd:$1$hash:0:0:1000-01-01:/site:/bin/false\n\
             uploader:$1$hash:104:300:2020-01-01:/site:/bin/false\n\
             \n\
             broken line\n",
        );
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0], "glftpd");
        assert_eq!(map[&104], "uploader");
    }

    #[test]
    fn test_parse_group_lines() {
        let map = parse_id_file("SiTEOP:Site Operators:100:\nFRiENDS:Friends:300:\n");
        assert_eq!(map[&300], "FRiENDS");
    }

    #[test]
    fn test_unknown_ids() {
        let ids = IdentityMap::new(
            HashMap::from([(1, "alice".to_string())]),
            HashMap::new(),
        );
        assert_eq!(ids.user(1), "alice");
        assert_eq!(ids.user(2), UNKNOWN);
        assert_eq!(ids.group(1), UNKNOWN);
    }

    #[test]
    fn test_load_missing_files_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = IdentityMap::load(tmp.path()).unwrap_err();
        assert!(matches!(err, AuditError::Identity { .. }));
    }

    #[test]
    fn test_load_from_site_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("etc")).unwrap();
        std::fs::write(tmp.path().join("etc/passwd"), "bob:x:7:7::/site:/bin/false\n").unwrap();
        std::fs::write(tmp.path().join("etc/group"), "GRP:desc:7:\n").unwrap();
        let ids = IdentityMap::load(tmp.path()).unwrap();
        assert_eq!(ids.user(7), "bob");
        assert_eq!(ids.group(7), "GRP");
    }
}
