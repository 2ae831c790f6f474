//! Announcing releases that still lack something.
//!
//! Messages go to the glftpd log, where the site bot picks them up and
//! relays them to the configured output chain. With `--silent` they are
//! only logged locally.

use crate::config::AuditConfig;
use crate::evaluator::{DeficiencyReport, Owner};
use crate::release::Release;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// First line of every site-log announce run.
pub const HEADER: &str = "Please complete the following releases:";

/// Timestamp layout glftpd uses in its own log.
const SITE_LOG_TIME_FORMAT: &str = "%a %b %d %T %Y";

const IRC_BOLD: char = '\x02';

/// A release that is still incomplete after evaluation.
#[derive(Debug, Clone)]
pub struct Finding {
    pub release: Release,
    pub report: DeficiencyReport,
    pub owner: Owner,
}

/// Turns findings into announce lines.
pub struct Announcer<'a> {
    config: &'a AuditConfig,
}

impl<'a> Announcer<'a> {
    pub fn new(config: &'a AuditConfig) -> Self {
        Self { config }
    }

    pub fn format(&self, finding: &Finding) -> String {
        let site = &self.config.site;
        let (user, group) = if finding.release.parent_matches_any(&site.mask_userinfo_paths) {
            (site.mask_user.as_str(), site.mask_group.as_str())
        } else {
            (finding.owner.user.as_str(), finding.owner.group.as_str())
        };
        let announce_path = &finding.release.announce_path;
        let release = &finding.release.name;
        let reasons = finding.report.joined();

        if self.config.announce.irc_bold {
            let b = IRC_BOLD;
            format!(
                "    {announce_path}/{b}{release}{b} lacks {b}{reasons}{b}, was sent by {b}{user}{b}/{group}"
            )
        } else {
            format!("{announce_path}/{release} lacks {reasons}, was sent by {user}/{group}")
        }
    }
}

/// Destination for announce lines.
pub trait AnnounceSink {
    /// Called once before the first message of a run.
    fn begin(&mut self) {}

    fn announce(&mut self, message: &str);
}

/// Appends lines to the glftpd log in its native format.
pub struct SiteLogSink {
    path: PathBuf,
    chain: String,
    delay: Duration,
}

impl SiteLogSink {
    pub fn new(path: PathBuf, chain: impl Into<String>, delay: Duration) -> Self {
        Self {
            path,
            chain: chain.into(),
            delay,
        }
    }

    pub fn format_line(&self, message: &str) -> String {
        let ts = chrono::Utc::now().format(SITE_LOG_TIME_FORMAT);
        format!("{ts} {}: \"{message}\"\n", self.chain)
    }

    fn write_line(&self, message: &str) {
        let line = self.format_line(message);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = result {
            error!(path = %self.path.display(), error = %err, "Unable to write to site log");
        }
    }
}

impl AnnounceSink for SiteLogSink {
    fn begin(&mut self) {
        self.write_line(HEADER);
    }

    fn announce(&mut self, message: &str) {
        self.write_line(message);
        // the bot drops lines that share a timestamp with the previous one
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

/// Local-only output for `--silent` runs.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AnnounceSink for TracingSink {
    fn announce(&mut self, message: &str) {
        info!("{message}");
    }
}

/// Send every finding to `sink`, returning how many lines were announced.
pub fn announce_all(sink: &mut dyn AnnounceSink, announcer: &Announcer<'_>, findings: &[Finding]) -> usize {
    sink.begin();
    for finding in findings {
        sink.announce(&announcer.format(finding));
    }
    findings.len()
}
