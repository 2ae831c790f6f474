//! SFV manifest parsing.
//!
//! Only the file names matter here; checksums are zipscript's business. A
//! manifest is trusted completely or not at all: one bad line and it is
//! treated as missing.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

fn sfv_line() -> &'static Regex {
    static SFV_LINE: OnceLock<Regex> = OnceLock::new();
    SFV_LINE.get_or_init(|| Regex::new(r"^\S+ [a-fA-F0-9]{8}$").expect("sfv line pattern is valid"))
}

fn is_sfv_line(line: &str) -> bool {
    sfv_line().is_match(line)
}

/// Parse manifest text into lower-cased file names, in listing order.
///
/// Returns an empty list when any non-comment line is malformed.
pub fn parse_sfv_str(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if !is_sfv_line(line) {
            return Vec::new();
        }
        if let Some((name, _)) = line.split_once(' ') {
            names.push(name.to_lowercase());
        }
    }
    names
}

/// Read and parse a manifest; unreadable files count as empty manifests.
pub fn parse_sfv(path: &Path) -> Vec<String> {
    match std::fs::read(path) {
        Ok(bytes) => parse_sfv_str(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable sfv, treating as absent");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_manifest() {
        let names = parse_sfv_str("a.r00 aabbccdd\na.r01 11223344\n");
        assert_eq!(names, vec!["a.r00", "a.r01"]);
    }

    #[test]
    fn test_malformed_line_discards_everything() {
        let names = parse_sfv_str("a.r00 aabbccdd\na.r01 11223344\ngarbage\n");
        assert!(names.is_empty());
    }

    #[test]
    fn test_comments_blank_lines_and_case() {
        let content = "; Generated by cksfv\n;\n\r\nShow.S01E01-GRP.RAR DEADBEEF\r\n";
        assert_eq!(parse_sfv_str(content), vec!["show.s01e01-grp.rar"]);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        assert!(parse_sfv_str("a.rar 1234567\n").is_empty());
        assert!(parse_sfv_str("a.rar 1234567g\n").is_empty());
        assert!(parse_sfv_str("a b.rar 12345678\n").is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        assert!(parse_sfv(Path::new("/nonexistent/rlsaudit.sfv")).is_empty());
    }
}
