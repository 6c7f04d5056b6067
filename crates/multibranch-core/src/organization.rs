//! Organization folders: the same reconciliation one level up.
//!
//! Navigators enumerate repositories instead of heads. Each repository
//! becomes a nested [`MultiBranchProject`], named with the same mangler,
//! owned by the highest priority navigator that reports it and marked dead
//! (never deleted) when no navigator does.

use crate::branch::Branch;
use crate::container::MultiBranchProject;
use crate::error::{ReconcileError, Result};
use crate::lifecycle::{classify, kill, Transition};
use crate::mangle::mangle;
use crate::priority::{arbitrate_ids, Arbitration};
use crate::progress::ProgressSink;
use crate::reconcile::{check_unique_ids, Cancellation};
use crate::report::{Change, FailedSource, ReconcileReport};
use crate::source::{BranchSource, SourceResult};
use crate::types::{Head, ScmRef};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

pub trait ProjectObserver {
    /// One repository and the sources its container should use.
    fn observe(&mut self, name: &str, sources: Vec<BranchSource>);

    fn is_observing(&self) -> bool {
        true
    }
}

pub trait Navigator: Send + Sync {
    fn id(&self) -> &str;

    fn visit(&self, observer: &mut dyn ProjectObserver, progress: &dyn ProgressSink) -> SourceResult<()>;
}

pub trait ContainerFactory: Send + Sync {
    /// A fresh container for `name`, stored under `encoded`.
    fn create(
        &self,
        name: &str,
        encoded: &str,
        sources: Vec<BranchSource>,
    ) -> Result<Arc<MultiBranchProject>>;
}

/// Builds in-memory containers with default collaborators.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContainerFactory;

impl ContainerFactory for DefaultContainerFactory {
    fn create(
        &self,
        _name: &str,
        encoded: &str,
        sources: Vec<BranchSource>,
    ) -> Result<Arc<MultiBranchProject>> {
        Ok(Arc::new(
            MultiBranchProject::builder(encoded).sources(sources).build()?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOutcome {
    pub name: String,
    pub repository: String,
    pub navigator: String,
    pub change: Change,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizationReport {
    pub outcomes: Vec<ProjectOutcome>,
    pub failed_navigators: Vec<FailedSource>,
    /// Repositories whose container could not be created or re-sourced.
    pub failed_repositories: Vec<FailedSource>,
    /// Scans of the nested containers, when requested.
    pub nested: BTreeMap<String, ReconcileReport>,
    pub nested_errors: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// OrganizationFolder
// ---------------------------------------------------------------------------

struct OrgChild {
    /// Ownership expressed as a branch so the lifecycle rules apply as-is.
    owner: Branch,
    source_ids: Vec<String>,
    container: Arc<MultiBranchProject>,
}

#[derive(Default)]
struct Collect {
    seen: Vec<(String, Vec<BranchSource>)>,
}

impl ProjectObserver for Collect {
    fn observe(&mut self, name: &str, sources: Vec<BranchSource>) {
        self.seen.push((name.to_string(), sources));
    }
}

pub struct OrganizationFolder {
    name: String,
    navigators: Mutex<Arc<Vec<Arc<dyn Navigator>>>>,
    factory: Arc<dyn ContainerFactory>,
    children: Mutex<BTreeMap<String, OrgChild>>,
}

impl OrganizationFolder {
    pub fn new(
        name: impl Into<String>,
        navigators: Vec<Arc<dyn Navigator>>,
        factory: Arc<dyn ContainerFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            navigators: Mutex::new(Arc::new(navigators)),
            factory,
            children: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the navigators. Repositories owned by a navigator that is
    /// gone are handed over or marked dead on the next scan.
    pub fn set_navigators(&self, navigators: Vec<Arc<dyn Navigator>>) -> Result<()> {
        let ids: Vec<&str> = navigators.iter().map(|n| n.id()).collect();
        check_navigator_ids(&ids)?;
        *self.navigators.lock() = Arc::new(navigators);
        Ok(())
    }

    pub fn project(&self, name: &str) -> Option<Arc<MultiBranchProject>> {
        let children = self.children.lock();
        children
            .get(name)
            .or_else(|| children.get(&mangle(name)))
            .map(|c| Arc::clone(&c.container))
    }

    /// Encoded names with their owning navigator (the dead sentinel for
    /// repositories no navigator reports).
    pub fn projects(&self) -> Vec<(String, String)> {
        self.children
            .lock()
            .iter()
            .map(|(name, c)| (name.clone(), c.owner.source_id().to_string()))
            .collect()
    }

    /// Reconcile every navigator. With `recurse`, containers that were
    /// created, reopened or re-sourced are scanned before returning; a failed
    /// nested scan is reported in `nested_errors` and the others still run.
    pub fn scan(
        &self,
        progress: &dyn ProgressSink,
        cancel: &Cancellation,
        recurse: bool,
    ) -> Result<OrganizationReport> {
        let navigators = self.navigators.lock().clone();
        let ids: Vec<&str> = navigators.iter().map(|n| n.id()).collect();
        check_navigator_ids(&ids)?;

        let mut children = self.children.lock();
        progress.phase(&format!("Scanning organization {}", self.name));

        let mut report = OrganizationReport::default();
        let mut staged: BTreeMap<String, OrgChild> = BTreeMap::new();
        // Applied to existing containers only once the pass can no longer be
        // cancelled.
        let mut resource: Vec<(String, Vec<BranchSource>)> = Vec::new();
        let mut claimed: BTreeMap<String, String> = BTreeMap::new();
        let mut fetched = BTreeSet::new();
        let mut touched = Vec::new();

        for navigator in navigators.iter() {
            cancel.check()?;
            let mut collect = Collect::default();
            if let Err(e) = navigator.visit(&mut collect, progress) {
                tracing::warn!(navigator = navigator.id(), "navigation failed: {e}");
                report.failed_navigators.push(FailedSource {
                    id: navigator.id().to_string(),
                    error: e.to_string(),
                });
                continue;
            }
            cancel.check()?;
            fetched.insert(navigator.id().to_string());

            for (repository, sources) in collect.seen {
                let encoded = mangle(&repository);
                if claimed.contains_key(&encoded) {
                    continue;
                }
                let existing = children.get(&encoded);
                if let Some(child) = existing {
                    let owner = child.owner.source_id();
                    if !child.owner.is_dead()
                        && owner != navigator.id()
                        && arbitrate_ids(ids.iter().copied(), owner, navigator.id())
                            == Arbitration::OwnerWins
                        && !fetched.contains(owner)
                    {
                        progress.line(&format!(
                            "Ignoring {repository} from {} as {owner} owns it",
                            navigator.id()
                        ));
                        claimed.insert(encoded, owner.to_string());
                        continue;
                    }
                }
                claimed.insert(encoded.clone(), navigator.id().to_string());

                let owner = Branch::live(
                    navigator.id(),
                    Head::branch(&repository),
                    ScmRef::new("navigator", navigator.id(), &repository),
                    Vec::new(),
                    Vec::new(),
                );
                let source_ids: Vec<String> = sources.iter().map(|s| s.id().to_string()).collect();
                let transition = classify(existing.map(|c| &c.owner), navigator.id());
                let outcome = match (transition, existing) {
                    (Transition::Create, _) => {
                        progress.line(&format!("New repository {repository}"));
                        self.factory
                            .create(&repository, &encoded, sources)
                            .map(|container| (container, Change::Created))
                    }
                    (_, Some(child)) => {
                        let change = match transition {
                            Transition::Refresh if child.source_ids == source_ids => {
                                Change::Unchanged
                            }
                            Transition::Refresh => Change::Updated,
                            _ => Change::Reopened {
                                from: child.owner.source_id().to_string(),
                            },
                        };
                        let checked = if change == Change::Unchanged {
                            Ok(())
                        } else {
                            check_unique_ids(&sources).map(|()| {
                                resource.push((encoded.clone(), sources));
                            })
                        };
                        checked.map(|()| (Arc::clone(&child.container), change))
                    }
                    (_, None) => continue,
                };
                let change = match outcome {
                    Ok((container, change)) => {
                        staged.insert(
                            encoded.clone(),
                            OrgChild {
                                owner,
                                source_ids,
                                container,
                            },
                        );
                        change
                    }
                    Err(e) => {
                        // The repository keeps whatever it had; its name stays
                        // claimed so it is not marked dead either.
                        tracing::warn!(repository = %repository, "cannot set up container: {e}");
                        progress.line(&format!("Skipping {repository}: {e}"));
                        report.failed_repositories.push(FailedSource {
                            id: repository.clone(),
                            error: e.to_string(),
                        });
                        Change::Skipped {
                            reason: e.to_string(),
                        }
                    }
                };
                if change.is_mutation() {
                    touched.push(encoded.clone());
                }
                report.outcomes.push(ProjectOutcome {
                    name: encoded,
                    repository,
                    navigator: navigator.id().to_string(),
                    change,
                });
            }
        }

        for (encoded, child) in children.iter() {
            if claimed.contains_key(encoded) || child.owner.is_dead() {
                continue;
            }
            let owner = child.owner.source_id();
            if report.failed_navigators.iter().any(|f| f.id == owner) {
                continue;
            }
            progress.line(&format!("Repository {} is no longer reported", child.owner.name()));
            report.outcomes.push(ProjectOutcome {
                name: encoded.clone(),
                repository: child.owner.name().to_string(),
                navigator: owner.to_string(),
                change: Change::Dead,
            });
            staged.insert(
                encoded.clone(),
                OrgChild {
                    owner: kill(&child.owner),
                    source_ids: child.source_ids.clone(),
                    container: Arc::clone(&child.container),
                },
            );
        }
        cancel.check()?;

        for (encoded, sources) in resource {
            let Some(child) = staged.get(&encoded) else {
                continue;
            };
            if let Err(e) = child.container.set_sources(sources) {
                tracing::warn!(container = %encoded, "could not re-source: {e}");
                staged.remove(&encoded);
                touched.retain(|t| t != &encoded);
                report.failed_repositories.push(FailedSource {
                    id: encoded.clone(),
                    error: e.to_string(),
                });
                if let Some(outcome) = report.outcomes.iter_mut().find(|o| o.name == encoded) {
                    outcome.change = Change::Skipped {
                        reason: e.to_string(),
                    };
                }
            }
        }
        children.extend(staged);
        drop(children);

        if recurse {
            for encoded in touched {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(container) = self.project(&encoded) else {
                    continue;
                };
                match container.scan(progress, cancel) {
                    Ok(nested) => {
                        report.nested.insert(encoded, nested);
                    }
                    Err(e) => {
                        tracing::warn!(container = %encoded, "nested scan failed: {e}");
                        report.nested_errors.insert(encoded, e.to_string());
                    }
                }
            }
        }
        progress.phase(&format!("Finished scanning organization {}", self.name));
        Ok(report)
    }
}

fn check_navigator_ids(ids: &[&str]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(*id) {
            return Err(ReconcileError::DuplicateSourceId(id.to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::BufferedProgress;
    use crate::sources::MemorySource;

    struct FixedNavigator {
        id: String,
        repos: Mutex<Vec<String>>,
        fail: Mutex<bool>,
        /// Repositories reported with two sources sharing one id.
        broken: Mutex<BTreeSet<String>>,
        /// Adds a second source to every repository.
        extra_source: Mutex<bool>,
        /// Cancelled once the visit has reported everything.
        cancel_after: Mutex<Option<Cancellation>>,
    }

    impl FixedNavigator {
        fn new(id: &str, repos: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                repos: Mutex::new(repos.iter().map(|r| r.to_string()).collect()),
                fail: Mutex::new(false),
                broken: Mutex::new(BTreeSet::new()),
                extra_source: Mutex::new(false),
                cancel_after: Mutex::new(None),
            })
        }

        fn source(&self, id: String) -> BranchSource {
            BranchSource::new(Arc::new(MemorySource::new(id).with_branch("main", "1")))
        }
    }

    impl Navigator for FixedNavigator {
        fn id(&self) -> &str {
            &self.id
        }

        fn visit(
            &self,
            observer: &mut dyn ProjectObserver,
            _progress: &dyn ProgressSink,
        ) -> SourceResult<()> {
            if *self.fail.lock() {
                return Err(crate::error::SourceError::Unavailable {
                    source_id: self.id.clone(),
                    reason: "down".to_string(),
                });
            }
            for repo in self.repos.lock().iter() {
                let id = format!("{}:{repo}", self.id);
                let mut sources = vec![self.source(id.clone())];
                if self.broken.lock().contains(repo) {
                    sources.push(self.source(id));
                } else if *self.extra_source.lock() {
                    sources.push(self.source(format!("{id}:mirror")));
                }
                observer.observe(repo, sources);
            }
            if let Some(cancel) = self.cancel_after.lock().as_ref() {
                cancel.cancel();
            }
            Ok(())
        }
    }

    fn folder(navs: Vec<Arc<FixedNavigator>>) -> OrganizationFolder {
        let navigators = navs
            .into_iter()
            .map(|n| n as Arc<dyn Navigator>)
            .collect();
        OrganizationFolder::new("org", navigators, Arc::new(DefaultContainerFactory))
    }

    #[test]
    fn creates_nested_containers_and_scans_them() {
        let org = folder(vec![FixedNavigator::new("hub", &["web", "api/v2"])]);
        let progress = BufferedProgress::new();
        let report = org.scan(&progress, &Cancellation::new(), true).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.nested.len(), 2);
        let web = org.project("web").unwrap();
        assert_eq!(web.children().len(), 1);
        assert!(org.project("api/v2").is_some());

        let again = org.scan(&progress, &Cancellation::new(), true).unwrap();
        assert!(again.outcomes.iter().all(|o| o.change == Change::Unchanged));
        assert!(again.nested.is_empty());
    }

    #[test]
    fn priority_and_dead_lifecycle() {
        let first = FixedNavigator::new("first", &["web"]);
        let second = FixedNavigator::new("second", &["web", "docs"]);
        let org = folder(vec![first.clone(), second.clone()]);
        let progress = BufferedProgress::new();
        org.scan(&progress, &Cancellation::new(), false).unwrap();
        let owners: BTreeMap<String, String> = org.projects().into_iter().collect();
        assert_eq!(owners["web"], "first");
        assert_eq!(owners["docs"], "second");

        first.repos.lock().clear();
        let report = org.scan(&progress, &Cancellation::new(), false).unwrap();
        let web = report.outcomes.iter().find(|o| o.name == "web").unwrap();
        assert!(matches!(web.change, Change::Reopened { .. }));

        *second.fail.lock() = true;
        let report = org.scan(&progress, &Cancellation::new(), false).unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(report.failed_navigators.len(), 1);

        *second.fail.lock() = false;
        second.repos.lock().retain(|r| r != "docs");
        let report = org.scan(&progress, &Cancellation::new(), false).unwrap();
        let docs = report.outcomes.iter().find(|o| o.name == "docs").unwrap();
        assert_eq!(docs.change, Change::Dead);
        assert!(org.project("docs").is_some());
    }

    #[test]
    fn removed_navigator_releases_its_repositories() {
        let first = FixedNavigator::new("first", &["web", "docs"]);
        let second = FixedNavigator::new("second", &["web"]);
        let org = folder(vec![first.clone(), second.clone()]);
        let progress = BufferedProgress::new();
        org.scan(&progress, &Cancellation::new(), false).unwrap();

        org.set_navigators(vec![second as Arc<dyn Navigator>]).unwrap();
        let report = org.scan(&progress, &Cancellation::new(), false).unwrap();
        let web = report.outcomes.iter().find(|o| o.name == "web").unwrap();
        assert_eq!(
            web.change,
            Change::Reopened {
                from: "first".to_string()
            }
        );
        let docs = report.outcomes.iter().find(|o| o.name == "docs").unwrap();
        assert_eq!(docs.change, Change::Dead);
        let owners: BTreeMap<String, String> = org.projects().into_iter().collect();
        assert_eq!(owners["web"], "second");
        assert!(org.project("docs").is_some());
    }

    #[test]
    fn duplicate_navigator_ids_rejected() {
        let org = folder(vec![FixedNavigator::new("hub", &[])]);
        let again = vec![
            FixedNavigator::new("hub", &[]) as Arc<dyn Navigator>,
            FixedNavigator::new("hub", &[]) as Arc<dyn Navigator>,
        ];
        assert!(matches!(
            org.set_navigators(again),
            Err(ReconcileError::DuplicateSourceId(_))
        ));
    }

    #[test]
    fn one_bad_repository_does_not_stop_the_others() {
        let hub = FixedNavigator::new("hub", &["good-a", "bad", "good-z"]);
        hub.broken.lock().insert("bad".to_string());
        let org = folder(vec![hub]);
        let report = org
            .scan(&BufferedProgress::new(), &Cancellation::new(), true)
            .unwrap();

        assert!(org.project("good-a").is_some());
        assert!(org.project("good-z").is_some());
        assert!(org.project("bad").is_none());
        assert_eq!(report.failed_repositories.len(), 1);
        assert_eq!(report.failed_repositories[0].id, "bad");
        let bad = report.outcomes.iter().find(|o| o.name == "bad").unwrap();
        assert!(matches!(bad.change, Change::Skipped { .. }));
        assert_eq!(report.nested.len(), 2);
    }

    #[test]
    fn bad_new_sources_keep_the_old_ones() {
        let hub = FixedNavigator::new("hub", &["web"]);
        let org = folder(vec![hub.clone()]);
        let progress = BufferedProgress::new();
        org.scan(&progress, &Cancellation::new(), false).unwrap();

        hub.broken.lock().insert("web".to_string());
        let report = org.scan(&progress, &Cancellation::new(), false).unwrap();
        assert!(matches!(report.outcomes[0].change, Change::Skipped { .. }));
        assert_eq!(org.project("web").unwrap().source_ids(), vec!["hub:web"]);
        let owners: BTreeMap<String, String> = org.projects().into_iter().collect();
        assert_eq!(owners["web"], "hub");
    }

    #[test]
    fn cancelled_scan_does_not_resource_containers() {
        let hub = FixedNavigator::new("hub", &["web"]);
        let org = folder(vec![hub.clone()]);
        let progress = BufferedProgress::new();
        org.scan(&progress, &Cancellation::new(), false).unwrap();

        let cancel = Cancellation::new();
        *hub.extra_source.lock() = true;
        *hub.cancel_after.lock() = Some(cancel.clone());
        let result = org.scan(&progress, &cancel, false);
        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        assert_eq!(org.project("web").unwrap().source_ids(), vec!["hub:web"]);

        *hub.cancel_after.lock() = None;
        let report = org.scan(&progress, &Cancellation::new(), false).unwrap();
        assert_eq!(report.outcomes[0].change, Change::Updated);
        assert_eq!(
            org.project("web").unwrap().source_ids(),
            vec!["hub:web", "hub:web:mirror"]
        );
    }
}
