//! One audit pass over every configured section.

use crate::announce::Finding;
use crate::context::RunContext;
use crate::dispatch::{Dispatcher, Outcome};
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::release::Release;
use crate::scanner::discover_releases;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Totals for one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub releases: usize,
    pub skipped: usize,
    pub complete: usize,
    pub pending: usize,
    pub nuked: usize,
    pub errors: usize,
    /// Findings to announce, in path order.
    pub findings: Vec<Finding>,
}

impl RunSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped(_) | Outcome::Cleared => self.skipped += 1,
            Outcome::Settled | Outcome::FixRecorded | Outcome::Complete | Outcome::Recheck => {
                self.complete += 1
            }
            Outcome::Pending(finding) => {
                self.pending += 1;
                self.findings.push(finding);
            }
            Outcome::Nuked(finding) => {
                self.nuked += 1;
                self.findings.push(finding);
            }
        }
    }
}

/// Candidate releases from every section, sorted by path.
///
/// A section that cannot be listed is logged and skipped.
pub fn discover(ctx: &RunContext) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for section in &ctx.config.site.sections {
        match discover_releases(section, &ctx.matchers) {
            Ok(found) => paths.extend(found),
            Err(err) => warn!(section = %section.display(), error = %err, "Cannot list section"),
        }
    }
    paths.sort();
    paths
}

/// Evaluate and settle every release. Errors stay with their release.
pub fn run(ctx: &RunContext) -> RunSummary {
    let dispatcher = Dispatcher::new(ctx);
    let evaluator = Evaluator::new(ctx, &dispatcher);
    let mut summary = RunSummary::default();

    for path in discover(ctx) {
        let Some(release) = Release::from_path(&path, &ctx.config.site) else {
            debug!(path = %path.display(), "skipping release with a non UTF-8 path");
            continue;
        };
        summary.releases += 1;
        match process(&evaluator, &dispatcher, &release) {
            Ok(outcome) => summary.record(outcome),
            Err(err) => {
                summary.errors += 1;
                warn!(release = %release.name, path = %release.containing_path, error = %err, "Release failed");
            }
        }
    }

    info!(
        releases = summary.releases,
        pending = summary.pending,
        nuked = summary.nuked,
        errors = summary.errors,
        "Audit finished"
    );
    summary
}

fn process(evaluator: &Evaluator<'_>, dispatcher: &Dispatcher<'_>, release: &Release) -> Result<Outcome> {
    let verdict = evaluator.evaluate(release)?;
    dispatcher.apply(release, verdict)
}
