//! Point-in-time copy of the site dupe database.

use std::collections::HashSet;

/// File names known to the dupe database when the run started.
#[derive(Debug, Clone, Default)]
pub struct DupeSnapshot {
    keys: HashSet<String>,
}

impl DupeSnapshot {
    /// Build from `dupelist` output: the first whitespace token of each line.
    pub fn from_listing(listing: &str) -> Self {
        let keys = listing
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect();
        Self { keys }
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.keys.contains(file_name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
