//! Directory-name predicates.
//!
//! Traversal code only asks "is this name a complete marker?" and similar
//! questions through [`NamePredicate`], so tests can swap the configured
//! regexes for fixed strings.

use crate::config::PatternConfig;
use regex::{Regex, RegexBuilder};

/// A yes/no test on a single directory or file name.
pub trait NamePredicate {
    fn matches(&self, name: &str) -> bool;
}

/// How a regex is applied to a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Match anywhere in the name.
    Search,
    /// Match must begin at the first character.
    Start,
}

/// Regex-backed predicate.
#[derive(Debug, Clone)]
pub struct RegexPredicate {
    regex: Regex,
}

impl RegexPredicate {
    pub fn new(pattern: &str, anchor: Anchor, case_insensitive: bool) -> Result<Self, regex::Error> {
        let source = match anchor {
            Anchor::Search => pattern.to_string(),
            Anchor::Start => format!("^(?:{pattern})"),
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(Self { regex })
    }
}

impl NamePredicate for RegexPredicate {
    fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Case-insensitive substring predicate, mostly for tests.
#[derive(Debug, Clone)]
pub struct ContainsPredicate {
    needles: Vec<String>,
}

impl ContainsPredicate {
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl NamePredicate for ContainsPredicate {
    fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.needles.iter().any(|n| name.contains(n.as_str()))
    }
}

/// The five name predicates the scanner and evaluator consult.
pub struct Matchers {
    pub complete: Box<dyn NamePredicate>,
    pub incomplete: Box<dyn NamePredicate>,
    pub day_bucket: Box<dyn NamePredicate>,
    pub nuke: Box<dyn NamePredicate>,
    pub special: Box<dyn NamePredicate>,
}

impl std::fmt::Debug for Matchers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matchers").finish_non_exhaustive()
    }
}

impl Matchers {
    /// Compile the configured regexes.
    ///
    /// Complete markers and day buckets are case-sensitive; the rest ignore
    /// case. Day buckets and nuke prefixes are anchored at the start of the
    /// name. All compile errors are returned together.
    pub fn compile(patterns: &PatternConfig) -> Result<Self, Vec<String>> {
        let mut issues = Vec::new();
        let mut build = |key: &str, pattern: &str, anchor: Anchor, ci: bool| {
            match RegexPredicate::new(pattern, anchor, ci) {
                Ok(p) => Some(Box::new(p) as Box<dyn NamePredicate>),
                Err(e) => {
                    issues.push(format!("`patterns.{key}` is not a valid regex: {e}"));
                    None
                }
            }
        };

        let complete = build("complete", &patterns.complete, Anchor::Search, false);
        let incomplete = build("incomplete", &patterns.incomplete, Anchor::Search, true);
        let day_bucket = build("day_bucket", &patterns.day_bucket, Anchor::Start, false);
        let nuke = build("nuke", &patterns.nuke, Anchor::Start, true);
        let special = build("special", &patterns.special, Anchor::Search, true);

        match (complete, incomplete, day_bucket, nuke, special) {
            (Some(complete), Some(incomplete), Some(day_bucket), Some(nuke), Some(special)) => {
                Ok(Self {
                    complete,
                    incomplete,
                    day_bucket,
                    nuke,
                    special,
                })
            }
            _ => Err(issues),
        }
    }
}
