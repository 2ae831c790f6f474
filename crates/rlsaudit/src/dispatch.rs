//! Side effects for evaluated releases.
//!
//! The evaluator only decides. Everything that touches the site (ledger
//! rows, pending markers, nukes, rescans, undupes, junk removal) goes
//! through [`Dispatcher`]. Failures of a single side effect are logged and
//! swallowed so one broken release never stops the batch; only ledger
//! errors are returned to the caller.

use crate::announce::Finding;
use crate::context::RunContext;
use crate::error::Result;
use crate::evaluator::{Evaluation, SkipReason, Verdict};
use crate::release::{chroot_path, Release};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Reason code handed to the nuker.
pub const NUKE_REASON: &str = "incomplete";

const HEADDATA_LOCK: &str = "headdata.lock";
const HEADDATA_PREFIX: &str = "headdata";

/// What happened to a release this run.
#[derive(Debug, Clone)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Already processed; at most a stale marker was removed.
    Cleared,
    /// Complete or approved earlier, now marked processed.
    Settled,
    FixRecorded,
    Complete,
    /// Nothing missing, but a rescan fired; look again next run.
    Recheck,
    Pending(Finding),
    Nuked(Finding),
}

impl Outcome {
    /// The finding to announce, if any.
    pub fn finding(&self) -> Option<&Finding> {
        match self {
            Outcome::Pending(finding) | Outcome::Nuked(finding) => Some(finding),
            _ => None,
        }
    }
}

pub struct Dispatcher<'a> {
    ctx: &'a RunContext,
}

impl<'a> Dispatcher<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    pub fn apply(&self, release: &Release, verdict: Verdict) -> Result<Outcome> {
        let ledger = &self.ctx.ledger;
        match verdict {
            Verdict::Skipped(reason) => {
                debug!(release = %release.name, ?reason, "skipped");
                Ok(Outcome::Skipped(reason))
            }
            Verdict::AlreadyProcessed(_) => {
                self.clear_marker(release);
                Ok(Outcome::Cleared)
            }
            Verdict::Settled(record) => {
                self.clear_marker(release);
                ledger.update_processed(record.id, true)?;
                Ok(Outcome::Settled)
            }
            Verdict::FixRelease(prior) => {
                info!(release = %release.name, "Fix release, recording as complete");
                match prior {
                    Some(record) => ledger.mark_complete(record.id)?,
                    None => {
                        ledger.insert(&release.name, &release.containing_path, false, false, true)?;
                    }
                }
                self.clear_marker(release);
                Ok(Outcome::FixRecorded)
            }
            Verdict::Evaluated(evaluation) => self.settle(release, evaluation),
        }
    }

    fn settle(&self, release: &Release, evaluation: Evaluation) -> Result<Outcome> {
        let Evaluation {
            report,
            rescanned,
            owner,
            prior,
        } = evaluation;

        if !report.is_empty()
            && release.parent_matches_any(&self.ctx.config.site.nuke_on_inc_paths)
        {
            info!(release = %release.name, reasons = %report.joined(), "Nuking incomplete release");
            if let Err(err) = self.ctx.actions.nuke(&release.chroot_path(), NUKE_REASON) {
                warn!(release = %release.name, error = %err, "nuke failed");
            }
            return Ok(Outcome::Nuked(Finding {
                release: release.clone(),
                report,
                owner,
            }));
        }

        if report.is_empty() {
            self.clear_marker(release);
        } else {
            self.ensure_marker(release);
        }

        let incomplete = !report.is_empty() || rescanned;
        match prior {
            Some(record) => self.ctx.ledger.update_incomplete(record.id, incomplete)?,
            None => {
                self.ctx.ledger.insert(
                    &release.name,
                    &release.containing_path,
                    incomplete,
                    false,
                    !incomplete,
                )?;
            }
        }

        Ok(if !report.is_empty() {
            Outcome::Pending(Finding {
                release: release.clone(),
                report,
                owner,
            })
        } else if rescanned {
            Outcome::Recheck
        } else {
            Outcome::Complete
        })
    }

    /// Ask zipscript to re-verify a directory level (a host path).
    ///
    /// A leftover `headdata.lock` in the zipscript cache makes the rescan a
    /// no-op, so the cached head data is dropped first.
    pub fn rescan(&self, level: &Path) {
        let chroot = chroot_path(&self.ctx.config.site.root, level);
        let cache = self
            .ctx
            .config
            .tools
            .zipscript_cache
            .join(chroot.strip_prefix("/").unwrap_or(&chroot));
        if cache.join(HEADDATA_LOCK).is_file() {
            info!(path = %cache.display(), "Removing stale headdata files");
            if let Err(err) = remove_headdata(&cache) {
                warn!(path = %cache.display(), error = %err, "could not clear headdata");
            }
        }

        info!(path = %chroot.display(), "Triggering rescan");
        if let Err(err) = self.ctx.actions.rescan(&chroot) {
            warn!(path = %chroot.display(), error = %err, "rescan failed");
        }
    }

    /// Drop a `-missing` placeholder's dupe entry so the file can be re-uploaded.
    pub fn undupe(&self, release: &Release, file_name: &str) {
        if !self.ctx.dupes.contains(file_name) {
            return;
        }
        info!(release = %release.name, file = file_name, "Triggering undupe");
        if let Err(err) = self.ctx.actions.undupe(file_name) {
            warn!(release = %release.name, file = file_name, error = %err, "undupe failed");
        }
    }

    pub fn remove_junk(&self, path: &Path) {
        info!(path = %path.display(), "Removing junk file");
        if let Err(err) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "could not remove junk file");
        }
    }

    fn marker_path(&self, release: &Release) -> std::path::PathBuf {
        self.ctx.config.pending_dir.join(&release.name)
    }

    fn ensure_marker(&self, release: &Release) {
        let link = self.marker_path(release);
        let target = release.marker_target();
        let result = match std::fs::symlink_metadata(&link) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                std::os::unix::fs::symlink(&target, &link)
            }
            Err(err) => Err(err),
            Ok(meta) if meta.file_type().is_symlink() => {
                if link.is_dir() {
                    Ok(())
                } else {
                    debug!(link = %link.display(), "replacing dangling marker");
                    std::fs::remove_file(&link)
                        .and_then(|_| std::os::unix::fs::symlink(&target, &link))
                }
            }
            Ok(_) => {
                warn!(link = %link.display(), "not a symlink, leaving pending marker alone");
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(release = %release.name, link = %link.display(), error = %err, "could not create pending marker");
        }
    }

    fn clear_marker(&self, release: &Release) {
        let link = self.marker_path(release);
        let is_link = std::fs::symlink_metadata(&link)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return;
        }
        if let Err(err) = std::fs::remove_file(&link) {
            warn!(release = %release.name, link = %link.display(), error = %err, "could not remove pending marker");
        }
    }
}

fn remove_headdata(cache: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(cache)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(HEADDATA_PREFIX) {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
