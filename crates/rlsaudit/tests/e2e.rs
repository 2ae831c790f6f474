//! End-to-end tests for rlsaudit
//!
//! Each test builds a throwaway glftpd root, runs a full audit pass with
//! recording site actions, and checks ledger rows, pending markers and the
//! commands that would have been run.

use filetime::{set_file_mtime, FileTime};
use rlsaudit::dupes::DupeSnapshot;
use rlsaudit::identity::IdentityMap;
use rlsaudit::{
    run, AuditConfig, Ledger, Matchers, Result, RunContext, RunSummary, SiteActions,
};
use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

const COMPLETE_MARKER: &str = "[iND] - ( 2F - COMPLETE ) - [iND]";
const INCOMPLETE_MARKER: &str = "[iND] - ( 1 of 2 - INCOMPLETE ) - [iND]";

/// Site actions that only remember what they were asked to do.
#[derive(Clone, Default)]
struct Recorder {
    calls: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl SiteActions for Recorder {
    fn nuke(&self, chroot_path: &Path, reason: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("nuke {} {reason}", chroot_path.display()));
        Ok(())
    }

    fn undupe(&self, file_name: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("undupe {file_name}"));
        Ok(())
    }

    fn rescan(&self, chroot_path: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("rescan {}", chroot_path.display()));
        Ok(())
    }

    fn list_dupes(&self) -> Result<String> {
        Ok(String::new())
    }
}

/// A glftpd root in a temp dir with a single `tv` section
struct TestEnv {
    /// Temp directory (cleaned up on drop)
    temp: TempDir,
    pub section: PathBuf,
    pub pending: PathBuf,
    pub recorder: Recorder,
    pub ctx: RunContext,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_site("", "")
    }

    fn with_site(extra_site: &str, dupes: &str) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path();
        let section = root.join("site/tv");
        let pending = root.join("site/_incomplete");
        fs::create_dir_all(&section).expect("Failed to create section");
        fs::create_dir_all(&pending).expect("Failed to create staging dir");

        let meta = fs::metadata(root).unwrap();
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(
            root.join("etc/passwd"),
            format!("alice:x:{}:{}::/site:/bin/false\n", meta.uid(), meta.gid()),
        )
        .unwrap();
        fs::write(root.join("etc/group"), format!("iND:x:{}:\n", meta.gid())).unwrap();

        let config = AuditConfig::from_toml_str(&format!(
            r#"
chain = "ANNOUNCE"

[site]
root = "{root}"
conf = "{root}/glftpd.conf"
log = "/ftp-data/logs/glftpd.log"
sections = ["/site/tv"]
{extra_site}

[ledger]
path = "{root}/ftp-data/incompletes.sqlite3"

[pending]
dir = "/site/_incomplete"

[patterns]
complete = "- COMPLETE \\)"
incomplete = "INCOMPLETE"
day_bucket = "\\d{{4}}-\\d{{2}}-\\d{{2}}"
nuke = "NUKED-"
special = "NFOFIX|SAMPLEFIX|PROPER"

[announce]
delay_ms = 0
irc_bold = false
"#,
            root = root.display()
        ))
        .expect("Failed to parse config");

        let matchers = Matchers::compile(&config.patterns).unwrap();
        let ledger = Ledger::open(&config.ledger_path).unwrap();
        let identities = IdentityMap::load(root).unwrap();
        let recorder = Recorder::default();
        let ctx = RunContext::new(
            config,
            matchers,
            identities,
            DupeSnapshot::from_listing(dupes),
            ledger,
            Box::new(recorder.clone()),
        );

        Self {
            temp,
            section,
            pending,
            recorder,
            ctx,
        }
    }

    fn write_file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.section.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.section.join(rel);
        fs::create_dir_all(&path).expect("Failed to create dir");
        path
    }

    fn write_sfv(&self, rel: &str, files: &[&str]) {
        let body: String = files
            .iter()
            .map(|f| format!("{f} aabbccdd\n"))
            .collect();
        self.write_file(rel, &format!("; generated by zipscript\n{body}"));
    }

    /// A release with everything a complete tv release needs.
    fn complete_release(&self, name: &str) -> PathBuf {
        self.write_file(&format!("{name}/{name}.nfo"), "nfo");
        self.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00", "a.r01"]);
        self.write_file(&format!("{name}/a.r00"), "x");
        self.write_file(&format!("{name}/a.r01"), "x");
        self.write_file(&format!("{name}/Sample/{name}-sample.mkv"), "x");
        self.mkdir(&format!("{name}/{COMPLETE_MARKER}"))
    }

    /// Push the release's mtime an hour into the past, past the race guard.
    fn age(&self, name: &str) {
        let hour_ago = chrono::Utc::now().timestamp() - 3600;
        set_file_mtime(self.section.join(name), FileTime::from_unix_time(hour_ago, 0))
            .expect("Failed to set mtime");
    }

    fn run(&self) -> RunSummary {
        run(&self.ctx)
    }

    fn marker(&self, name: &str) -> PathBuf {
        self.pending.join(name)
    }

    fn has_marker(&self, name: &str) -> bool {
        fs::symlink_metadata(self.marker(name)).is_ok()
    }

    fn record(&self, name: &str) -> Option<rlsaudit::LedgerRecord> {
        self.ctx.ledger.lookup(name, "/site/tv").unwrap()
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }
}

// ============================================================================
// Evaluation scenarios
// ============================================================================

#[test]
fn test_missing_sample_is_pending() {
    let env = TestEnv::new();
    let name = "Show.S01E01.720p-iND";
    env.write_file(&format!("{name}/{name}.nfo"), "nfo");
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00", "a.r01"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.write_file(&format!("{name}/a.r01"), "x");
    env.mkdir(&format!("{name}/{COMPLETE_MARKER}"));
    env.age(name);

    let summary = env.run();

    assert_eq!(summary.pending, 1);
    let finding = &summary.findings[0];
    assert_eq!(finding.report.reasons(), ["sample".to_string()]);
    assert_eq!(finding.owner.user, "alice");
    assert_eq!(finding.owner.group, "iND");

    let record = env.record(name).expect("ledger row");
    assert!(record.incomplete);
    assert!(!record.processed);

    assert_eq!(
        fs::read_link(env.marker(name)).unwrap(),
        PathBuf::from(format!("../tv/{name}"))
    );
    assert!(env.recorder.calls().is_empty());
}

#[test]
fn test_complete_marker_with_missing_file_rescans_once() {
    let env = TestEnv::new();
    let name = "Show.S01E02.720p-iND";
    env.write_file(&format!("{name}/{name}.nfo"), "nfo");
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00", "a.r01"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.mkdir(&format!("{name}/{COMPLETE_MARKER}"));
    env.write_file(&format!("{name}/Sample/sample.mkv"), "x");
    // a deeper level that also claims complete but lacks a listed file
    env.write_sfv(&format!("{name}/Subs/subs.sfv"), &["subs.rar"]);
    env.mkdir(&format!("{name}/Subs/{COMPLETE_MARKER}"));
    env.age(name);

    let summary = env.run();

    assert_eq!(
        env.recorder.calls(),
        vec![format!("rescan /site/tv/{name}")]
    );
    assert!(summary.findings.is_empty());
    let record = env.record(name).expect("ledger row");
    assert!(record.incomplete);
    assert!(!record.processed);
}

#[test]
fn test_manifest_without_marker_triggers_rescan() {
    let env = TestEnv::new();
    let name = "Show.S01E03.720p-iND";
    env.write_file(&format!("{name}/{name}.nfo"), "nfo");
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.write_file(&format!("{name}/Sample/sample.mkv"), "x");
    env.age(name);

    env.run();

    assert_eq!(
        env.recorder.calls(),
        vec![format!("rescan /site/tv/{name}")]
    );
}

#[test]
fn test_incomplete_marker_reports_completeness() {
    let env = TestEnv::new();
    let name = "Show.S01E04.720p-iND";
    env.write_file(&format!("{name}/{name}.nfo"), "nfo");
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00", "a.r01"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.mkdir(&format!("{name}/{INCOMPLETE_MARKER}"));
    env.write_file(&format!("{name}/Sample/sample.mkv"), "x");
    env.mkdir(&format!("{name}/Proof"));
    env.age(name);

    let summary = env.run();

    assert_eq!(
        summary.findings[0].report.reasons(),
        ["completeness".to_string(), "file in proof".to_string()]
    );
    assert_eq!(
        env.recorder.calls(),
        vec![format!("rescan /site/tv/{name}")]
    );
}

#[test]
fn test_fix_release_covers_missing_nfo() {
    let env = TestEnv::new();
    let name = "Show.S01E05-iND";
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.write_file(&format!("{name}/Sample/sample.mkv"), "x");
    env.mkdir(&format!("{name}/{COMPLETE_MARKER}"));
    env.mkdir("Show.S01E05.NFOFIX-iND");
    env.age(name);
    env.age("Show.S01E05.NFOFIX-iND");

    let summary = env.run();

    assert!(summary.findings.is_empty(), "{:?}", summary.findings);
    let record = env.record(name).expect("ledger row");
    assert!(!record.incomplete);
    assert!(record.processed);

    let fix = env.record("Show.S01E05.NFOFIX-iND").expect("fix row");
    assert!(!fix.incomplete);
    assert!(fix.processed);
}

#[test]
fn test_fix_release_with_incomplete_row_converges() {
    let env = TestEnv::new();
    let name = "Show.S01E11.PROPER.720p-iND";
    env.mkdir(name);
    env.age(name);
    // left incomplete by an earlier pass before the name counted as special
    let id = env
        .ctx
        .ledger
        .insert(name, "/site/tv", true, false, false)
        .unwrap();
    std::os::unix::fs::symlink(format!("../tv/{name}"), env.marker(name)).unwrap();

    for _ in 0..3 {
        let summary = env.run();
        assert!(summary.findings.is_empty());
    }

    assert_eq!(env.ctx.ledger.count().unwrap(), 1);
    let record = env.record(name).expect("ledger row");
    assert_eq!(record.id, id);
    assert!(!record.incomplete);
    assert!(record.processed);
    assert!(!env.has_marker(name));
}

#[test]
fn test_sentinel_directory_is_ignored() {
    let env = TestEnv::new();
    env.write_file("tmp/partial.r00", "x");
    env.age("tmp");

    let summary = env.run();

    assert_eq!(summary.skipped, 1);
    assert!(env.record("tmp").is_none());
    assert!(!env.has_marker("tmp"));
}

#[test]
fn test_fix_from_other_group_does_not_count() {
    let env = TestEnv::new();
    let name = "Show.S01E06-iND";
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.write_file(&format!("{name}/Sample/sample.mkv"), "x");
    env.mkdir(&format!("{name}/{COMPLETE_MARKER}"));
    env.mkdir("Show.S01E06.NFOFIX-OTHER");
    env.age(name);

    let summary = env.run();

    assert_eq!(summary.findings.len(), 1);
    assert_eq!(summary.findings[0].report.reasons(), ["nfo".to_string()]);
}

// ============================================================================
// Guards and ledger short-circuits
// ============================================================================

#[test]
fn test_young_release_is_left_alone() {
    let env = TestEnv::new();
    let name = "Fresh.Upload-iND";
    env.mkdir(&format!("{name}/{INCOMPLETE_MARKER}"));

    let summary = env.run();

    assert_eq!(summary.skipped, 1);
    assert!(summary.findings.is_empty());
    assert!(env.record(name).is_none());
    assert!(!env.has_marker(name));
    assert!(env.recorder.calls().is_empty());
}

#[test]
fn test_second_run_is_idempotent() {
    let env = TestEnv::new();
    let name = "Show.S01E07.720p-iND";
    env.complete_release(name);
    env.age(name);

    let first = env.run();
    assert_eq!(first.complete, 1);
    let record = env.record(name).expect("ledger row");
    assert!(record.processed);
    assert!(!record.incomplete);

    let second = env.run();
    assert_eq!(second.skipped, 1);
    assert!(second.findings.is_empty());
    assert!(env.recorder.calls().is_empty());
    assert!(!env.has_marker(name));

    let again = env.record(name).expect("ledger row");
    assert_eq!(again.id, record.id);
    assert_eq!(again.processed, record.processed);
    assert_eq!(again.incomplete, record.incomplete);
    assert_eq!(env.ctx.ledger.count().unwrap(), 1);
}

#[test]
fn test_approval_overrides_evaluation() {
    let env = TestEnv::new();
    let name = "Broken.Release-iND";
    env.mkdir(&format!("{name}/{INCOMPLETE_MARKER}"));
    env.age(name);
    let id = env
        .ctx
        .ledger
        .insert(name, "/site/tv", true, false, false)
        .unwrap();
    env.ctx.ledger.set_approved(id, true).unwrap();
    std::os::unix::fs::symlink(format!("../tv/{name}"), env.marker(name)).unwrap();

    let summary = env.run();

    assert!(summary.findings.is_empty());
    assert!(env.recorder.calls().is_empty());
    assert!(!env.has_marker(name));
    let record = env.record(name).expect("ledger row");
    assert!(record.processed);
}

#[test]
fn test_marker_follows_report() {
    let env = TestEnv::new();
    env.complete_release("Good-iND");
    env.write_file("Bad-iND/a.r00", "x");
    env.age("Good-iND");
    env.age("Bad-iND");
    // stale marker from an earlier run
    std::os::unix::fs::symlink("../tv/Good-iND", env.marker("Good-iND")).unwrap();

    let summary = env.run();

    assert_eq!(summary.pending, 1);
    assert!(!env.has_marker("Good-iND"));
    assert!(env.has_marker("Bad-iND"));
    assert!(env.marker("Bad-iND").is_dir());
}

// ============================================================================
// Remediation
// ============================================================================

#[test]
fn test_nuke_on_incomplete_section() {
    let env = TestEnv::with_site("nuke_on_inc_paths = [\"/site/tv\"]", "");
    let name = "Unwanted-iND";
    env.write_file(&format!("{name}/a.r00"), "x");
    env.age(name);

    let summary = env.run();

    assert_eq!(summary.nuked, 1);
    assert_eq!(summary.findings.len(), 1);
    assert_eq!(
        env.recorder.calls(),
        vec![format!("nuke /site/tv/{name} incomplete")]
    );
    assert!(!env.has_marker(name));
    assert!(env.record(name).is_none());
}

#[test]
fn test_missing_placeholders_undupe_known_files() {
    let env = TestEnv::with_site("", "a.r01 1700000000 alice\n");
    let name = "Show.S01E08.720p-iND";
    env.write_file(&format!("{name}/{name}.nfo"), "nfo");
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00", "a.r01", "a.r02"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.write_file(&format!("{name}/a.r01-missing"), "");
    env.write_file(&format!("{name}/a.r02-missing"), "");
    env.mkdir(&format!("{name}/{INCOMPLETE_MARKER}"));
    env.age(name);

    env.run();

    let calls = env.recorder.calls();
    assert!(calls.contains(&"undupe a.r01".to_string()), "{calls:?}");
    assert!(!calls.contains(&"undupe a.r02".to_string()), "{calls:?}");
}

#[test]
fn test_junk_nfo_in_subs_is_removed() {
    let env = TestEnv::new();
    let name = "Show.S01E09.720p-iND";
    env.complete_release(name);
    let junk = env.write_file(&format!("{name}/Subs/junk.nfo"), "x");
    env.write_sfv(&format!("{name}/Subs/subs.sfv"), &["subs.rar"]);
    env.write_file(&format!("{name}/Subs/subs.rar"), "x");
    env.mkdir(&format!("{name}/Subs/{COMPLETE_MARKER}"));
    env.age(name);

    let summary = env.run();

    assert!(!junk.exists());
    assert!(summary.findings.is_empty());
}

#[test]
fn test_no_sample_section_and_masking() {
    let env = TestEnv::with_site(
        "no_sample_paths = [\"/site/tv\"]\nmask_userinfo_paths = [\"/site/tv\"]",
        "",
    );
    let name = "Show.S01E10.720p-iND";
    env.write_sfv(&format!("{name}/{name}.sfv"), &["a.r00"]);
    env.write_file(&format!("{name}/a.r00"), "x");
    env.mkdir(&format!("{name}/{COMPLETE_MARKER}"));
    env.age(name);

    let summary = env.run();

    assert_eq!(summary.findings[0].report.reasons(), ["nfo".to_string()]);
    let announcer = rlsaudit::Announcer::new(&env.ctx.config);
    assert_eq!(
        announcer.format(&summary.findings[0]),
        format!("/tv/{name} lacks nfo, was sent by masked/masked")
    );
}

#[test]
fn test_site_log_announce() {
    let env = TestEnv::new();
    let name = "Lonely.File-iND";
    env.write_file(&format!("{name}/a.r00"), "x");
    env.age(name);
    let summary = env.run();

    let log = env.root().join("glftpd.log");
    let mut sink = rlsaudit::SiteLogSink::new(log.clone(), "ANNOUNCE", std::time::Duration::ZERO);
    let announcer = rlsaudit::Announcer::new(&env.ctx.config);
    let sent = rlsaudit::announce_all(&mut sink, &announcer, &summary.findings);

    assert_eq!(sent, 1);
    let content = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].ends_with("ANNOUNCE: \"Please complete the following releases:\""));
    assert!(lines[1].ends_with(&format!(
        "ANNOUNCE: \"/tv/{name} lacks nfo/sfv/sample, was sent by alice/iND\""
    )));
}
