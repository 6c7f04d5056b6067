//! Async fan-out of events and scans to registered containers.
//!
//! Reconciliation itself is synchronous. Each container runs on the
//! blocking pool; different containers proceed in parallel while passes on
//! one container queue behind its lock.

use crate::container::MultiBranchProject;
use crate::error::{ReconcileError, Result};
use crate::event::ScmEvent;
use crate::progress::ProgressSink;
use crate::reconcile::Cancellation;
use crate::report::ReconcileReport;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Per-container results of one dispatch.
pub type DispatchResults = BTreeMap<String, Result<ReconcileReport>>;

pub struct Dispatcher {
    containers: RwLock<BTreeMap<String, Arc<MultiBranchProject>>>,
    progress: Arc<dyn ProgressSink>,
    cancel: Cancellation,
}

impl Dispatcher {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            containers: RwLock::new(BTreeMap::new()),
            progress,
            cancel: Cancellation::new(),
        }
    }

    /// Replaces any container already registered under the same name.
    pub fn register(&self, container: Arc<MultiBranchProject>) {
        self.containers
            .write()
            .insert(container.name().to_string(), container);
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<MultiBranchProject>> {
        self.containers.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.containers.read().keys().cloned().collect()
    }

    /// Stops in-flight passes at their next checkpoint and every later one
    /// before it starts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// Offer one event to every container.
    pub async fn dispatch(&self, event: ScmEvent) -> DispatchResults {
        let event = Arc::new(event);
        let handles = self.spawn_each(|container, progress, cancel| {
            let event = Arc::clone(&event);
            move || container.on_event(&event, progress.as_ref(), &cancel)
        });
        collect(handles).await
    }

    pub async fn scan_all(&self) -> DispatchResults {
        let handles = self.spawn_each(|container, progress, cancel| {
            move || container.scan(progress.as_ref(), &cancel)
        });
        collect(handles).await
    }

    /// Full scans every `period` until `shutdown` resolves. The first scan
    /// runs immediately. A scan still running at shutdown is cancelled, so
    /// it commits nothing.
    pub async fn run_periodic<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut timer = tokio::time::interval(period);
        tokio::pin!(shutdown);
        info!("starting periodic reconciliation every {period:?}");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("cancelling the scan in progress");
                    self.cancel();
                    break;
                }
                results = self.scan_all() => log_scans(results),
            }
        }
        info!("periodic reconciliation stopped");
    }

    fn spawn_each<M, F>(&self, mut make: M) -> Vec<(String, JoinHandle<Result<ReconcileReport>>)>
    where
        M: FnMut(Arc<MultiBranchProject>, Arc<dyn ProgressSink>, Cancellation) -> F,
        F: FnOnce() -> Result<ReconcileReport> + Send + 'static,
    {
        let containers: Vec<_> = self
            .containers
            .read()
            .iter()
            .map(|(name, c)| (name.clone(), Arc::clone(c)))
            .collect();
        containers
            .into_iter()
            .map(|(name, container)| {
                let job = make(container, Arc::clone(&self.progress), self.cancel.clone());
                (name, tokio::task::spawn_blocking(job))
            })
            .collect()
    }
}

fn log_scans(results: DispatchResults) {
    for (name, result) in results {
        match result {
            Ok(report) => info!(
                container = %name,
                mutations = report.mutations(),
                scheduled = report.scheduled().len(),
                "scan complete"
            ),
            Err(e) => warn!(container = %name, "scan failed: {e}"),
        }
    }
}

async fn collect(handles: Vec<(String, JoinHandle<Result<ReconcileReport>>)>) -> DispatchResults {
    let mut results = BTreeMap::new();
    for (name, handle) in handles {
        let result = handle
            .await
            .map_err(|e| ReconcileError::Task(e.to_string()))
            .and_then(|r| r);
        results.insert(name, result);
    }
    results
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
