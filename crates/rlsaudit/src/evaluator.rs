//! Per-release completeness evaluation.
//!
//! # Decision order
//!
//! 1. Releases younger than [`MIN_RELEASE_AGE`] may still be racing the
//!    uploader and are left alone, as is the `tmp` directory.
//! 2. The ledger short-circuits anything already resolved: processed rows
//!    are skipped, complete or approved rows are settled.
//! 3. Fix releases (NFOFIX, PROPER, ...) are recorded as complete unseen.
//! 4. Everything else gets a full walk of its tree, collecting deficiency
//!    reasons and firing at most one rescan when zipscript's markers look
//!    stale or wrong.
//!
//! The evaluator decides; [`Dispatcher`] performs side effects. The only
//! effects issued mid-walk are the ones tied to a specific level (rescan,
//! undupe, junk removal), and those also go through the dispatcher.

use crate::context::RunContext;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::ledger::LedgerRecord;
use crate::release::Release;
use crate::sfv::parse_sfv;
use glob::Pattern;
use std::cell::OnceCell;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Releases younger than this are still being uploaded or raced.
pub const MIN_RELEASE_AGE: Duration = Duration::from_secs(60);

/// Name of the scratch directory some sections keep next to releases.
pub const SENTINEL_NAME: &str = "tmp";

const VIDEO_EXTENSIONS: &[&str] = &["avi", "m2ts", "mkv", "mp4", "vob"];
const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png"];
const PROOF_EXTENSIONS: &[&str] = &["jpeg", "jpg", "m2ts", "png", "rar", "vob"];
const MISSING_SUFFIX: &str = "-missing";

pub const REASON_COMPLETENESS: &str = "completeness";
pub const REASON_NFO: &str = "nfo";
pub const REASON_SFV: &str = "sfv";
pub const REASON_SAMPLE: &str = "sample";
pub const REASON_PROOF: &str = "file in proof";

/// Ordered reasons a release is considered incomplete. Empty means complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeficiencyReport {
    reasons: Vec<String>,
}

impl DeficiencyReport {
    pub fn push(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    pub fn extend(&mut self, other: DeficiencyReport) {
        self.reasons.extend(other.reasons);
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Reasons joined with `/`, as announced.
    pub fn joined(&self) -> String {
        self.reasons.join("/")
    }
}

/// Display names of the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooYoung,
    Sentinel,
    Vanished,
}

/// Result of a full tree walk.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub report: DeficiencyReport,
    /// A rescan was triggered during this pass.
    pub rescanned: bool,
    pub owner: Owner,
    /// Ledger row seen before the walk, if any.
    pub prior: Option<LedgerRecord>,
}

/// What the evaluator decided about one release.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Nothing to do this run; no ledger write.
    Skipped(SkipReason),
    /// Ledger says processed; only a stale marker may need clearing.
    AlreadyProcessed(LedgerRecord),
    /// Ledger says complete or approved; flip to processed.
    Settled(LedgerRecord),
    /// Fix release; record as complete without walking. Carries the
    /// still-incomplete row left by an earlier pass, if any.
    FixRelease(Option<LedgerRecord>),
    Evaluated(Evaluation),
}

/// How a directory level is annotated by zipscript markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Annotation {
    Unmarked,
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelKind {
    Root,
    Subs,
    Sample,
    Proof,
    Other,
}

impl LevelKind {
    fn of(is_root: bool, lower_name: &str) -> Self {
        if is_root {
            return Self::Root;
        }
        match lower_name {
            "subs" => Self::Subs,
            "sample" => Self::Sample,
            "proof" => Self::Proof,
            _ => Self::Other,
        }
    }
}

/// Accumulator folded through the tree walk.
#[derive(Debug, Default)]
struct WalkState {
    report: DeficiencyReport,
    samples: usize,
    rescanned: bool,
}

/// Entries of a single directory level.
#[derive(Debug, Default)]
struct Listing {
    /// Names of directories and of symlinks resolving to directories.
    subdir_names: Vec<String>,
    /// Real directories to descend into.
    children: Vec<PathBuf>,
    files: Vec<FileEntry>,
}

/// A plain file. `name` is for matching and reporting; `path` is the real
/// on-disk path, which may not be valid UTF-8.
#[derive(Debug)]
struct FileEntry {
    name: String,
    path: PathBuf,
}

fn list_level(dir: &Path) -> std::io::Result<Listing> {
    let mut entries = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .collect::<Vec<_>>();
    entries.sort_by_key(|e| e.file_name());

    let mut listing = Listing::default();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            listing.subdir_names.push(name);
            listing.children.push(entry.path());
        } else if file_type.is_symlink() && entry.path().is_dir() {
            listing.subdir_names.push(name);
        } else {
            listing.files.push(FileEntry {
                name,
                path: entry.path(),
            });
        }
    }
    Ok(listing)
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
}

fn has_extension(name: &str, set: &[&str]) -> bool {
    extension_of(name).is_some_and(|ext| set.contains(&ext.as_str()))
}

/// `Rel.720p-GRP.r00-missing` → `Rel.720p-GRP.r00`
fn strip_missing_suffix(name: &str) -> Option<&str> {
    let cut = name.len().checked_sub(MISSING_SUFFIX.len())?;
    if cut == 0 || !name.is_char_boundary(cut) {
        return None;
    }
    name[cut..]
        .eq_ignore_ascii_case(MISSING_SUFFIX)
        .then(|| &name[..cut])
}

/// Seconds since `min(mtime, ctime)`.
fn age_of(meta: &Metadata) -> Duration {
    let born = meta.mtime().min(meta.ctime());
    let now = chrono::Utc::now().timestamp();
    Duration::from_secs(u64::try_from(now - born).unwrap_or(0))
}

/// Glob matching names that differ from `release` only where it has a
/// separator (`.`, `-`, `_`), e.g. `Show.S01-GRP` → `Show*S01*GRP`.
pub fn fix_glob(release: &str) -> Option<Pattern> {
    let mut glob = String::with_capacity(release.len());
    for ch in release.chars() {
        match ch {
            '.' | '-' | '_' => glob.push('*'),
            '*' | '?' | '[' | ']' => glob.push_str(&Pattern::escape(&ch.to_string())),
            _ => glob.push(ch),
        }
    }
    Pattern::new(&glob).ok()
}

/// Trailing `-`-separated token, usually the release group.
pub fn group_token(name: &str) -> &str {
    name.rsplit('-').next().unwrap_or(name)
}

pub struct Evaluator<'a> {
    ctx: &'a RunContext,
    dispatcher: &'a Dispatcher<'a>,
}

/// Per-release scratch: the fix-check answer is computed at most once.
struct Scope<'r> {
    release: &'r Release,
    fixed: OnceCell<bool>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a RunContext, dispatcher: &'a Dispatcher<'a>) -> Self {
        Self { ctx, dispatcher }
    }

    pub fn evaluate(&self, release: &Release) -> Result<Verdict> {
        match std::fs::metadata(&release.path) {
            Ok(meta) if age_of(&meta) < MIN_RELEASE_AGE => {
                return Ok(Verdict::Skipped(SkipReason::TooYoung));
            }
            Ok(_) => {}
            Err(_) => return Ok(Verdict::Skipped(SkipReason::Vanished)),
        }

        if release.name == SENTINEL_NAME {
            return Ok(Verdict::Skipped(SkipReason::Sentinel));
        }

        let prior = self
            .ctx
            .ledger
            .lookup(&release.name, &release.containing_path)?;
        if let Some(record) = &prior {
            if record.processed {
                return Ok(Verdict::AlreadyProcessed(record.clone()));
            }
            if !record.incomplete || record.approved {
                return Ok(Verdict::Settled(record.clone()));
            }
        }

        if self.ctx.matchers.special.matches(&release.name) {
            return Ok(Verdict::FixRelease(prior));
        }

        let Some(meta) = stat_release(&release.path) else {
            return Ok(Verdict::Skipped(SkipReason::Vanished));
        };

        info!(release = %release.name, path = %release.containing_path, "Checking out release");
        let scope = Scope {
            release,
            fixed: OnceCell::new(),
        };
        let Some(state) = self.walk_root(&scope) else {
            return Ok(Verdict::Skipped(SkipReason::Vanished));
        };

        let WalkState {
            mut report,
            samples,
            rescanned,
        } = state;
        if samples == 0
            && !self.is_fixed(&scope)
            && !release.parent_matches_any(&self.ctx.config.site.no_sample_paths)
        {
            report.push(REASON_SAMPLE);
        }

        let owner = Owner {
            user: self.ctx.identities.user(meta.uid()).to_string(),
            group: self.ctx.identities.group(meta.gid()).to_string(),
        };

        Ok(Verdict::Evaluated(Evaluation {
            report,
            rescanned,
            owner,
            prior,
        }))
    }

    /// Whether a sibling fix release covers this one.
    pub fn fix_check(&self, release: &Release) -> bool {
        let Some(glob) = fix_glob(&release.name) else {
            return false;
        };
        let group = group_token(&release.name);
        let Ok(entries) = std::fs::read_dir(release.host_parent()) else {
            return false;
        };
        entries.filter_map(|e| e.ok()).any(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            glob.matches(&name)
                && self.ctx.matchers.special.matches(&name)
                && group_token(&name).eq_ignore_ascii_case(group)
        })
    }

    fn is_fixed(&self, scope: &Scope<'_>) -> bool {
        *scope.fixed.get_or_init(|| self.fix_check(scope.release))
    }

    fn walk_root(&self, scope: &Scope<'_>) -> Option<WalkState> {
        let root = &scope.release.path;
        let listing = match list_level(root) {
            Ok(listing) => listing,
            Err(err) => {
                debug!(path = %root.display(), error = %err, "release vanished during walk");
                return None;
            }
        };
        let state = self.visit_level(scope, root, true, &listing, WalkState::default());
        Some(self.descend(scope, &listing, state))
    }

    fn walk(&self, scope: &Scope<'_>, dir: &Path, state: WalkState) -> WalkState {
        match list_level(dir) {
            Ok(listing) => {
                let state = self.visit_level(scope, dir, false, &listing, state);
                self.descend(scope, &listing, state)
            }
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "skipping unreadable directory");
                state
            }
        }
    }

    fn descend(&self, scope: &Scope<'_>, listing: &Listing, state: WalkState) -> WalkState {
        listing
            .children
            .iter()
            .fold(state, |state, child| self.walk(scope, child, state))
    }

    fn annotation(&self, listing: &Listing) -> Annotation {
        let matchers = &self.ctx.matchers;
        for name in &listing.subdir_names {
            if matchers.complete.matches(name) {
                return Annotation::Complete;
            }
            if matchers.incomplete.matches(name) {
                return Annotation::Incomplete;
            }
        }
        Annotation::Unmarked
    }

    fn visit_level(
        &self,
        scope: &Scope<'_>,
        dir: &Path,
        is_root: bool,
        listing: &Listing,
        mut state: WalkState,
    ) -> WalkState {
        let level_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let kind = LevelKind::of(is_root, &level_name);

        let mut annotation = self.annotation(listing);
        if annotation == Annotation::Incomplete {
            if is_root {
                state.report.push(REASON_COMPLETENESS);
            } else {
                state
                    .report
                    .push(format!("{level_name} {REASON_COMPLETENESS}"));
            }
        }

        let mut manifests = 0usize;
        match kind {
            LevelKind::Root | LevelKind::Subs => {
                let (found, verified) =
                    self.check_metadata_level(scope, dir, is_root, listing, annotation, &mut state);
                manifests = found;
                if annotation == Annotation::Complete && !verified {
                    annotation = Annotation::Incomplete;
                }
            }
            LevelKind::Sample => {
                for file in &listing.files {
                    if has_extension(&file.name, VIDEO_EXTENSIONS) {
                        state.samples += 1;
                    } else if !has_extension(&file.name, IMAGE_EXTENSIONS) {
                        debug!(file = %file.name, dir = %dir.display(), "junk in sample directory");
                    }
                }
            }
            LevelKind::Proof => {
                let proofs = listing
                    .files
                    .iter()
                    .filter(|f| has_extension(&f.name, PROOF_EXTENSIONS))
                    .count();
                if proofs == 0 && !self.is_fixed(scope) {
                    state.report.push(REASON_PROOF);
                }
            }
            LevelKind::Other => {}
        }

        if !state.rescanned {
            if manifests > 0 && annotation == Annotation::Unmarked {
                info!(path = %dir.display(), "SFV present but no zipscript marker, rescanning");
                self.dispatcher.rescan(dir);
                state.rescanned = true;
            } else if annotation == Annotation::Incomplete {
                info!(path = %dir.display(), "Rescanning because it is incomplete");
                self.dispatcher.rescan(dir);
                state.rescanned = true;
            }
        }

        state
    }

    /// Info-file and manifest checks for the release root and `subs`.
    ///
    /// Returns the number of manifests found and whether every file they
    /// list is present (only checked on levels marked complete).
    fn check_metadata_level(
        &self,
        scope: &Scope<'_>,
        dir: &Path,
        is_root: bool,
        listing: &Listing,
        annotation: Annotation,
        state: &mut WalkState,
    ) -> (usize, bool) {
        let present: HashSet<String> = listing.files.iter().map(|f| f.name.to_lowercase()).collect();
        let mut infos = 0usize;
        let mut manifests = 0usize;
        let mut verified = true;

        for file in &listing.files {
            match extension_of(&file.name).as_deref() {
                Some("nfo") if is_root => infos += 1,
                Some("nfo") => self.dispatcher.remove_junk(&file.path),
                Some("sfv") => {
                    manifests += 1;
                    if annotation == Annotation::Complete && verified {
                        let listed = parse_sfv(&file.path);
                        if let Some(missing) = listed.iter().find(|n| !present.contains(*n)) {
                            debug!(path = %dir.display(), missing, "file listed in sfv is absent");
                            verified = false;
                        }
                    }
                }
                _ => {
                    if let Some(base) = strip_missing_suffix(&file.name) {
                        self.dispatcher.undupe(scope.release, base);
                    }
                }
            }
        }

        if is_root && infos == 0 && !self.is_fixed(scope) {
            state.report.push(REASON_NFO);
        }
        if manifests == 0 {
            if is_root {
                state.report.push(REASON_SFV);
            } else {
                let level = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                state.report.push(level);
            }
        }

        (manifests, verified)
    }
}

/// Stat the release, treating disappearance as a normal outcome.
fn stat_release(path: &Path) -> Option<Metadata> {
    std::fs::metadata(path).ok()
}
