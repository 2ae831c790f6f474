//! rlsaudit - release completeness auditor for glftpd sites
//!
//! Walks the configured sections, decides for every release whether it is
//! complete, nudges zipscript when its markers look stale, and announces
//! whatever is still missing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Scanner   │     │  Evaluator  │     │ Dispatcher  │     │  Announcer  │
//! │ (sections → │────▶│ (release →  │────▶│ (ledger,    │────▶│ (site log / │
//! │  releases)  │     │  verdict)   │     │  markers)   │     │  tracing)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            └───────┬───────────┘
//!                                    ▼
//!                             ┌─────────────┐
//!                             │ RunContext  │  config, matchers, ledger,
//!                             │ (immutable) │  identities, dupes, actions
//!                             └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Release**: a top-level upload directory inside a section
//! - **Ledger**: SQLite table remembering what was checked and approved
//! - **Pending marker**: symlink in the staging dir for each incomplete release
//! - **Fix release**: an NFOFIX/PROPER style release that covers another

pub mod actions;
pub mod announce;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod dupes;
pub mod error;
pub mod evaluator;
pub mod identity;
pub mod ledger;
pub mod matchers;
pub mod release;
pub mod runner;
pub mod scanner;
pub mod sfv;

// Re-exports for convenience
pub use actions::{GlftpdActions, SiteActions};
pub use announce::{announce_all, AnnounceSink, Announcer, Finding, SiteLogSink, TracingSink};
pub use config::AuditConfig;
pub use context::RunContext;
pub use dispatch::{Dispatcher, Outcome};
pub use error::{AuditError, Result};
pub use evaluator::{DeficiencyReport, Evaluator, Owner, SkipReason, Verdict};
pub use ledger::{Ledger, LedgerRecord};
pub use matchers::{Matchers, NamePredicate};
pub use release::Release;
pub use runner::{run, RunSummary};
