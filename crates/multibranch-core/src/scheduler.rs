use crate::project::ChildProject;
use crate::types::{Action, BuildCause, Revision};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Accepts build requests for child projects. Returning `false` means the
/// request was refused and the revision must not be recorded as built.
pub trait BuildScheduler: Send + Sync {
    fn schedule(&self, child: &ChildProject, causes: &[BuildCause], actions: &[Action]) -> bool;
}

/// A build request as recorded by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedBuild {
    pub name: String,
    pub branch: String,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    pub causes: Vec<BuildCause>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    pub queued_at: DateTime<Utc>,
}

impl QueuedBuild {
    pub fn new(child: &ChildProject, causes: &[BuildCause], actions: &[Action]) -> Self {
        Self {
            name: child.name.clone(),
            branch: child.branch_name().to_string(),
            source_id: child.branch.source_id().to_string(),
            revision: child.last_seen.clone(),
            causes: causes.to_vec(),
            actions: actions.to_vec(),
            queued_at: Utc::now(),
        }
    }
}

/// In-memory queue. Can be told to refuse everything.
#[derive(Debug, Default)]
pub struct QueueScheduler {
    queue: Mutex<Vec<QueuedBuild>>,
    refuse: Mutex<bool>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refusing(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }

    pub fn queued(&self) -> Vec<QueuedBuild> {
        self.queue.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Encoded names in scheduling order.
    pub fn names(&self) -> Vec<String> {
        self.queue.lock().iter().map(|b| b.name.clone()).collect()
    }

    pub fn drain(&self) -> Vec<QueuedBuild> {
        std::mem::take(&mut *self.queue.lock())
    }
}

impl BuildScheduler for QueueScheduler {
    fn schedule(&self, child: &ChildProject, causes: &[BuildCause], actions: &[Action]) -> bool {
        if *self.refuse.lock() {
            tracing::debug!(child = %child.name, "build refused");
            return false;
        }
        self.queue
            .lock()
            .push(QueuedBuild::new(child, causes, actions));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Branch;
    use crate::types::{Head, ScmRef};

    fn child() -> ChildProject {
        let mut child = ChildProject::new(
            "main",
            Branch::live(
                "origin",
                Head::branch("main"),
                ScmRef::new("git", "r", "refs/heads/main"),
                Vec::new(),
                Vec::new(),
            ),
        );
        child.last_seen = Some(Revision::new("abc"));
        child
    }

    #[test]
    fn queue_records_requests() {
        let scheduler = QueueScheduler::new();
        assert!(scheduler.schedule(&child(), &[BuildCause::BranchIndexing], &[]));
        let queued = scheduler.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].source_id, "origin");
        assert_eq!(queued[0].revision, Some(Revision::new("abc")));
        assert_eq!(scheduler.drain().len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn refusing_queue_records_nothing() {
        let scheduler = QueueScheduler::new();
        scheduler.set_refusing(true);
        assert!(!scheduler.schedule(&child(), &[BuildCause::BranchIndexing], &[]));
        assert_eq!(scheduler.len(), 0);
    }
}
