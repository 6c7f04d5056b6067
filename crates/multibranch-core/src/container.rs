//! The multi-branch container: sources, children and the lock that
//! serialises every reconciliation against them.

use crate::criteria::HeadCriteria;
use crate::error::{ReconcileError, Result};
use crate::event::ScmEvent;
use crate::mangle::mangle;
use crate::orphan::{DefaultOrphanPolicy, OrphanPolicy};
use crate::poll::{ChangePoller, HashPoller};
use crate::progress::ProgressSink;
use crate::project::{Child, ChildProject, DefaultProjectFactory, ProjectFactory};
use crate::property::is_suppressed;
use crate::reconcile::{
    check_unique_ids, reconcile_event, reconcile_scan, refresh_source_actions, Cancellation,
    PassEnv, PassOutput,
};
use crate::report::{BuildOutcome, Change, ChildOutcome, ReconcileReport};
use crate::scheduler::{BuildScheduler, QueueScheduler};
use crate::source::BranchSource;
use crate::store::{ChildStore, MemoryStore, SourceActions};
use crate::types::BuildCause;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

struct ContainerState {
    /// Replaced wholesale by `set_sources`, so a pass holding a clone of the
    /// `Arc` always sees one consistent list.
    sources: Arc<Vec<BranchSource>>,
    children: BTreeMap<String, Child>,
    source_actions: SourceActions,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct ContainerBuilder {
    name: String,
    sources: Vec<BranchSource>,
    factory: Arc<dyn ProjectFactory>,
    store: Arc<dyn ChildStore>,
    scheduler: Arc<dyn BuildScheduler>,
    poller: Arc<dyn ChangePoller>,
    criteria: Option<Arc<dyn HeadCriteria>>,
    orphans: Arc<dyn OrphanPolicy>,
}

impl ContainerBuilder {
    pub fn sources(mut self, sources: Vec<BranchSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn ProjectFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn store(mut self, store: Arc<dyn ChildStore>) -> Self {
        self.store = store;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn BuildScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn poller(mut self, poller: Arc<dyn ChangePoller>) -> Self {
        self.poller = poller;
        self
    }

    pub fn criteria(mut self, criteria: Arc<dyn HeadCriteria>) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn orphan_policy(mut self, orphans: Arc<dyn OrphanPolicy>) -> Self {
        self.orphans = orphans;
        self
    }

    pub fn build(self) -> Result<MultiBranchProject> {
        check_unique_ids(&self.sources)?;
        Ok(MultiBranchProject {
            name: self.name,
            factory: self.factory,
            store: self.store,
            scheduler: self.scheduler,
            poller: self.poller,
            criteria: self.criteria,
            orphans: self.orphans,
            state: Mutex::new(ContainerState {
                sources: Arc::new(self.sources),
                children: BTreeMap::new(),
                source_actions: SourceActions::new(),
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// MultiBranchProject
// ---------------------------------------------------------------------------

pub struct MultiBranchProject {
    name: String,
    factory: Arc<dyn ProjectFactory>,
    store: Arc<dyn ChildStore>,
    scheduler: Arc<dyn BuildScheduler>,
    poller: Arc<dyn ChangePoller>,
    criteria: Option<Arc<dyn HeadCriteria>>,
    orphans: Arc<dyn OrphanPolicy>,
    state: Mutex<ContainerState>,
}

impl MultiBranchProject {
    pub fn builder(name: impl Into<String>) -> ContainerBuilder {
        ContainerBuilder {
            name: name.into(),
            sources: Vec::new(),
            factory: Arc::new(DefaultProjectFactory),
            store: Arc::new(MemoryStore::new()),
            scheduler: Arc::new(QueueScheduler::new()),
            poller: Arc::new(HashPoller),
            criteria: None,
            orphans: Arc::new(DefaultOrphanPolicy::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the in-memory children and source metadata with what the
    /// store holds. Returns the number of children loaded.
    pub fn load(&self) -> Result<usize> {
        let children = self.store.load_children()?;
        let source_actions = self.store.load_source_actions()?;
        let mut state = self.state.lock();
        state.children = children
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();
        state.source_actions = source_actions;
        Ok(state.children.len())
    }

    /// Replace the ordered source list. Waits for any running pass.
    pub fn set_sources(&self, sources: Vec<BranchSource>) -> Result<()> {
        check_unique_ids(&sources)?;
        self.state.lock().sources = Arc::new(sources);
        Ok(())
    }

    pub fn sources(&self) -> Arc<Vec<BranchSource>> {
        Arc::clone(&self.state.lock().sources)
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources().iter().map(|s| s.id().to_string()).collect()
    }

    pub fn children(&self) -> Vec<Child> {
        self.state.lock().children.values().cloned().collect()
    }

    /// Look a child up by encoded name, falling back to the raw branch name.
    pub fn child(&self, name: &str) -> Option<Child> {
        let state = self.state.lock();
        state
            .children
            .get(name)
            .or_else(|| state.children.get(&mangle(name)))
            .cloned()
    }

    pub fn source_actions(&self) -> SourceActions {
        self.state.lock().source_actions.clone()
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    pub fn scan(&self, progress: &dyn ProgressSink, cancel: &Cancellation) -> Result<ReconcileReport> {
        let mut state = self.state.lock();
        let sources = Arc::clone(&state.sources);
        let output = reconcile_scan(self.env(&sources, &state.children, progress, cancel))?;
        // Metadata of sources no longer configured goes with them.
        state
            .source_actions
            .retain(|id, _| sources.iter().any(|s| s.id() == id));
        Ok(self.commit(&mut state, output, progress))
    }

    pub fn on_event(
        &self,
        event: &ScmEvent,
        progress: &dyn ProgressSink,
        cancel: &Cancellation,
    ) -> Result<ReconcileReport> {
        let mut state = self.state.lock();
        let sources = Arc::clone(&state.sources);
        let env = self.env(&sources, &state.children, progress, cancel);
        let output = match event {
            ScmEvent::Head(event) => reconcile_event(env, event)?,
            ScmEvent::Source(event) => refresh_source_actions(env, event)?,
        };
        Ok(self.commit(&mut state, output, progress))
    }

    fn env<'a>(
        &'a self,
        sources: &'a [BranchSource],
        children: &'a BTreeMap<String, Child>,
        progress: &'a dyn ProgressSink,
        cancel: &'a Cancellation,
    ) -> PassEnv<'a> {
        PassEnv {
            sources,
            children,
            factory: self.factory.as_ref(),
            poller: self.poller.as_ref(),
            criteria: self.criteria.as_deref(),
            progress,
            cancel,
            now: Utc::now(),
        }
    }

    /// Apply staged decisions: schedule, record the built revision on
    /// acceptance, then save. A failed save is logged and the pass goes on.
    fn commit(
        &self,
        state: &mut ContainerState,
        output: PassOutput,
        progress: &dyn ProgressSink,
    ) -> ReconcileReport {
        let mut outcomes = Vec::with_capacity(output.staged.len() + output.skipped.len());
        for staged in output.staged {
            let mut outcome = staged.outcome();
            let mut project = staged.project;
            if let Some(revision) = staged.schedule {
                let actions = project.branch.actions().to_vec();
                if self
                    .scheduler
                    .schedule(&project, std::slice::from_ref(&staged.cause), &actions)
                {
                    progress.line(&format!(
                        "Scheduled build for {} ({})",
                        project.branch_name(),
                        staged.cause
                    ));
                    self.factory.set_revision_hash(&mut project, revision);
                    outcome.build = BuildOutcome::Scheduled;
                } else {
                    progress.line(&format!("Build of {} was not accepted", project.branch_name()));
                    outcome.build = BuildOutcome::Rejected;
                }
            }
            if outcome.change.is_mutation() || outcome.build == BuildOutcome::Scheduled {
                outcome.persisted = self.save(&project, progress);
            }
            outcomes.push(outcome);
            state
                .children
                .insert(project.name.clone(), Child::Project(project));
        }
        outcomes.extend(output.skipped);

        if !output.source_actions.is_empty() {
            state.source_actions.extend(output.source_actions);
            if let Err(e) = self.store.save_source_actions(&state.source_actions) {
                tracing::warn!(container = %self.name, "could not save source metadata: {e}");
            }
        }

        ReconcileReport {
            outcomes,
            failed_sources: output.failed_sources,
        }
    }

    fn save(&self, project: &ChildProject, progress: &dyn ProgressSink) -> bool {
        match self.store.save(project) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(child = %project.name, "could not save child: {e}");
                progress.line(&format!("Could not save {}: {e}", project.name));
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Orphans and manual builds
    // -----------------------------------------------------------------------

    /// Delete the dead children the orphan policy selects. Returns the
    /// encoded names actually removed.
    pub fn prune_orphans(&self, progress: &dyn ProgressSink) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let selected = {
            let dead: Vec<&ChildProject> = state
                .children
                .values()
                .filter_map(Child::as_project)
                .filter(|p| p.is_dead())
                .collect();
            self.orphans.select(&dead, Utc::now())
        };
        let mut removed = Vec::new();
        for name in selected {
            match self.store.remove(&name) {
                Ok(()) => {
                    progress.line(&format!("Deleted orphaned child {name}"));
                    state.children.remove(&name);
                    removed.push(name);
                }
                Err(e) => tracing::warn!(child = %name, "could not delete orphan: {e}"),
            }
        }
        Ok(removed)
    }

    /// Ask for a build of one child outside reconciliation. Goes through the
    /// same suppression check and scheduler as automatic builds.
    pub fn request_build(
        &self,
        name: &str,
        cause: BuildCause,
        progress: &dyn ProgressSink,
    ) -> Result<ChildOutcome> {
        let mut state = self.state.lock();
        let key = if state.children.contains_key(name) {
            name.to_string()
        } else {
            mangle(name)
        };
        let child = state
            .children
            .get(&key)
            .ok_or_else(|| ReconcileError::ChildNotFound(name.to_string()))?;
        let project = match child.as_project() {
            Some(project) if self.factory.is_project(child) => project.clone(),
            _ => return Err(ReconcileError::NotAProject(name.to_string())),
        };

        let mut outcome = ChildOutcome {
            name: project.name.clone(),
            branch: project.branch_name().to_string(),
            source_id: Some(project.branch.source_id().to_string()),
            change: Change::Unchanged,
            build: BuildOutcome::NotRequested,
            persisted: true,
        };
        if project.is_dead() {
            progress.line(&format!("{} is dead and cannot be built", project.branch_name()));
            outcome.build = BuildOutcome::Rejected;
            return Ok(outcome);
        }
        if is_suppressed(project.branch.properties(), &cause)? {
            outcome.build = BuildOutcome::Suppressed;
            return Ok(outcome);
        }

        let mut project = project;
        let actions = project.branch.actions().to_vec();
        if !self
            .scheduler
            .schedule(&project, std::slice::from_ref(&cause), &actions)
        {
            outcome.build = BuildOutcome::Rejected;
            return Ok(outcome);
        }
        progress.line(&format!("Scheduled build for {} ({cause})", project.branch_name()));
        outcome.build = BuildOutcome::Scheduled;
        if let Some(seen) = project.last_seen.clone() {
            self.factory.set_revision_hash(&mut project, seen);
            outcome.persisted = self.save(&project, progress);
        }
        state
            .children
            .insert(project.name.clone(), Child::Project(project));
        Ok(outcome)
    }
}

impl std::fmt::Debug for MultiBranchProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiBranchProject")
            .field("name", &self.name)
            .field("sources", &self.source_ids())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::BufferedProgress;
    use crate::property::{BranchProperty, PropertyStrategy, SuppressionStrategy};
    use crate::sources::MemorySource;

    fn container(source: Arc<MemorySource>, scheduler: Arc<QueueScheduler>) -> MultiBranchProject {
        MultiBranchProject::builder("repo")
            .sources(vec![BranchSource::new(source)])
            .scheduler(scheduler)
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_source_ids_rejected_at_build() {
        let result = MultiBranchProject::builder("repo")
            .sources(vec![
                BranchSource::new(Arc::new(MemorySource::new("a"))),
                BranchSource::new(Arc::new(MemorySource::new("a"))),
            ])
            .build();
        assert!(matches!(result, Err(ReconcileError::DuplicateSourceId(_))));
    }

    #[test]
    fn child_lookup_by_raw_or_encoded_name() {
        let source = Arc::new(MemorySource::new("a").with_branch("feature/x", "1"));
        let project = container(source, Arc::new(QueueScheduler::new()));
        project
            .scan(&BufferedProgress::new(), &Cancellation::new())
            .unwrap();
        assert!(project.child("feature/x").is_some());
        assert!(project.child("feature-x.5q849a9lk505").is_some());
        assert!(project.child("nope").is_none());
    }

    #[test]
    fn manual_build_records_last_built() {
        let scheduler = Arc::new(QueueScheduler::new());
        let source = Arc::new(MemorySource::new("a").with_branch("main", "1"));
        let project = container(source, scheduler.clone());
        let progress = BufferedProgress::new();
        project.scan(&progress, &Cancellation::new()).unwrap();
        scheduler.drain();

        let outcome = project
            .request_build(
                "main",
                BuildCause::Manual {
                    user: "dana".to_string(),
                },
                &progress,
            )
            .unwrap();
        assert_eq!(outcome.build, BuildOutcome::Scheduled);
        assert_eq!(scheduler.len(), 1);
        assert!(matches!(
            project.request_build("nope", BuildCause::BranchIndexing, &progress),
            Err(ReconcileError::ChildNotFound(_))
        ));
    }

    #[test]
    fn indexing_suppression_skips_scan_builds_but_not_manual() {
        let scheduler = Arc::new(QueueScheduler::new());
        let source = Arc::new(MemorySource::new("a").with_branch("main", "1"));
        let project = MultiBranchProject::builder("repo")
            .sources(vec![BranchSource::new(source).with_properties(
                PropertyStrategy::Default {
                    properties: vec![BranchProperty::SuppressAutomaticTriggering {
                        strategy: SuppressionStrategy::Indexing,
                    }],
                },
            )])
            .scheduler(scheduler.clone())
            .build()
            .unwrap();
        let progress = BufferedProgress::new();
        let report = project.scan(&progress, &Cancellation::new()).unwrap();
        assert_eq!(report.outcomes[0].change, Change::Created);
        assert_eq!(report.outcomes[0].build, BuildOutcome::Suppressed);
        assert!(scheduler.is_empty());

        let outcome = project
            .request_build(
                "main",
                BuildCause::Manual {
                    user: "dana".to_string(),
                },
                &progress,
            )
            .unwrap();
        assert_eq!(outcome.build, BuildOutcome::Scheduled);
    }

    #[test]
    fn prune_removes_dead_children() {
        let source = Arc::new(MemorySource::new("a").with_branch("main", "1"));
        let project = container(source.clone(), Arc::new(QueueScheduler::new()));
        let progress = BufferedProgress::new();
        project.scan(&progress, &Cancellation::new()).unwrap();
        source.remove_head("main");
        let report = project.scan(&progress, &Cancellation::new()).unwrap();
        assert_eq!(report.outcomes[0].change, Change::Dead);
        assert_eq!(project.prune_orphans(&progress).unwrap(), vec!["main"]);
        assert!(project.children().is_empty());
    }
}
