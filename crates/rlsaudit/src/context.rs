//! Per-run state, built once and shared read-only by every component.

use crate::actions::{GlftpdActions, SiteActions};
use crate::config::AuditConfig;
use crate::dupes::DupeSnapshot;
use crate::error::{AuditError, Result};
use crate::identity::IdentityMap;
use crate::ledger::Ledger;
use crate::matchers::Matchers;
use tracing::{debug, info};

pub struct RunContext {
    pub config: AuditConfig,
    pub matchers: Matchers,
    pub identities: IdentityMap,
    pub dupes: DupeSnapshot,
    pub ledger: Ledger,
    pub actions: Box<dyn SiteActions>,
}

impl RunContext {
    pub fn new(
        config: AuditConfig,
        matchers: Matchers,
        identities: IdentityMap,
        dupes: DupeSnapshot,
        ledger: Ledger,
        actions: Box<dyn SiteActions>,
    ) -> Self {
        Self {
            config,
            matchers,
            identities,
            dupes,
            ledger,
            actions,
        }
    }

    /// Open the ledger, load identities and snapshot the dupe database.
    ///
    /// Any failure here aborts the run before a single release is touched.
    pub fn bootstrap(config: AuditConfig) -> Result<Self> {
        let matchers = Matchers::compile(&config.patterns).map_err(AuditError::InvalidConfig)?;
        let ledger = Ledger::open(&config.ledger_path)?;
        let identities = IdentityMap::load(&config.site.root)?;
        let actions = GlftpdActions::new(&config);
        info!(rows = ledger.count()?, "Ledger ready");
        let dupes = DupeSnapshot::from_listing(&actions.list_dupes()?);
        if dupes.is_empty() {
            debug!("dupelist returned no entries");
        } else {
            info!(dupes = dupes.len(), "Dupe snapshot loaded");
        }

        Ok(Self::new(
            config,
            matchers,
            identities,
            dupes,
            ledger,
            Box::new(actions),
        ))
    }
}
