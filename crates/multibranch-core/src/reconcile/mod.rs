//! Reconciliation passes.
//!
//! A pass reads a snapshot of the container (sources and children), asks the
//! in-scope sources for their heads, and stages every decision. Nothing is
//! scheduled or saved until the container commits the staged output, so a
//! pass that is cancelled or fails leaves the container untouched.

mod event;
mod pass;
mod scan;

pub use event::{reconcile_event, refresh_source_actions};
pub use pass::{PassOutput, Staged};
pub use scan::reconcile_scan;

use crate::criteria::HeadCriteria;
use crate::error::{ReconcileError, Result};
use crate::poll::ChangePoller;
use crate::progress::ProgressSink;
use crate::project::{Child, ProjectFactory};
use crate::source::BranchSource;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag that stops a pass at the next source or head boundary.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ReconcileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// PassEnv
// ---------------------------------------------------------------------------

/// Everything a pass reads. The source list and children are a snapshot
/// taken under the container lock.
#[derive(Clone, Copy)]
pub struct PassEnv<'a> {
    pub sources: &'a [BranchSource],
    pub children: &'a BTreeMap<String, Child>,
    pub factory: &'a dyn ProjectFactory,
    pub poller: &'a dyn ChangePoller,
    pub criteria: Option<&'a dyn HeadCriteria>,
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a Cancellation,
    pub now: DateTime<Utc>,
}

/// Source ids must be unique or arbitration is meaningless.
pub fn check_unique_ids(sources: &[BranchSource]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for source in sources {
        if !seen.insert(source.id()) {
            return Err(ReconcileError::DuplicateSourceId(source.id().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;

    #[test]
    fn cancellation_is_shared() {
        let token = Cancellation::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ReconcileError::Cancelled)));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let sources = vec![
            BranchSource::new(Arc::new(MemorySource::new("a"))),
            BranchSource::new(Arc::new(MemorySource::new("b"))),
            BranchSource::new(Arc::new(MemorySource::new("a"))),
        ];
        assert!(matches!(
            check_unique_ids(&sources),
            Err(ReconcileError::DuplicateSourceId(id)) if id == "a"
        ));
        assert!(check_unique_ids(&sources[..2]).is_ok());
    }
}
