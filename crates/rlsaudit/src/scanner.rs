//! Release discovery under a section root.
//!
//! Day-bucket directories (`0101`, `2024-01-31`, ...) are containers and
//! are expanded in place; anything matching the nuke pattern is skipped
//! together with its contents. Every other real directory is a release.
//! Symlinks are never followed.

use crate::error::Result;
use crate::matchers::Matchers;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Find candidate release directories below `root`.
///
/// Fails only when `root` itself cannot be listed; unreadable day buckets
/// are logged and skipped.
pub fn discover_releases(root: &Path, matchers: &Matchers) -> Result<Vec<PathBuf>> {
    let mut releases = Vec::new();
    collect(root, matchers, &mut releases)?;
    Ok(releases)
}

fn collect(dir: &Path, matchers: &Matchers, out: &mut Vec<PathBuf>) -> Result<()> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if matchers.day_bucket.matches(&name) {
            if let Err(err) = collect(entry.path(), matchers, out) {
                warn!(dir = %entry.path().display(), error = %err, "Skipping day bucket");
            }
        } else if matchers.nuke.matches(&name) {
            debug!(dir = %entry.path().display(), "Skipping nuked directory");
        } else {
            out.push(entry.into_path());
        }
    }
    Ok(())
}
