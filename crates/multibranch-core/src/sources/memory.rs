use crate::criteria::HeadCriteria;
use crate::error::SourceError;
use crate::event::{HeadEvent, SourceEvent};
use crate::progress::ProgressSink;
use crate::source::{offer, HeadObserver, ScmSource, SourceResult};
use crate::types::{Action, Head, Revision, ScmRef};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct State {
    heads: BTreeMap<String, (Head, Revision)>,
    head_actions: BTreeMap<String, Vec<Action>>,
    source_actions: Vec<Action>,
}

/// An in-process source whose heads are set directly. Failures can be
/// injected to exercise the transient-error paths.
#[derive(Debug)]
pub struct MemorySource {
    id: String,
    state: RwLock<State>,
    failures: Mutex<usize>,
    failing_actions: Mutex<BTreeSet<String>>,
    fetches: Mutex<usize>,
}

impl MemorySource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(State::default()),
            failures: Mutex::new(0),
            failing_actions: Mutex::new(BTreeSet::new()),
            fetches: Mutex::new(0),
        }
    }

    /// Builder form of [`MemorySource::set_head`] for plain branches.
    pub fn with_branch(self, name: &str, revision: &str) -> Self {
        self.set_head(Head::branch(name), Revision::new(revision));
        self
    }

    pub fn set_head(&self, head: Head, revision: Revision) {
        self.state
            .write()
            .heads
            .insert(head.name.clone(), (head, revision));
    }

    pub fn set_branch(&self, name: &str, revision: &str) {
        self.set_head(Head::branch(name), Revision::new(revision));
    }

    pub fn remove_head(&self, name: &str) {
        self.state.write().heads.remove(name);
    }

    pub fn set_head_actions(&self, name: &str, actions: Vec<Action>) {
        self.state
            .write()
            .head_actions
            .insert(name.to_string(), actions);
    }

    pub fn set_source_actions(&self, actions: Vec<Action>) {
        self.state.write().source_actions = actions;
    }

    /// The next `n` fetches fail as if the repository were unreachable.
    pub fn fail_next(&self, n: usize) {
        *self.failures.lock() = n;
    }

    /// Metadata lookups for `name` fail until cleared.
    pub fn fail_actions_for(&self, name: &str) {
        self.failing_actions.lock().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        *self.failures.lock() = 0;
        self.failing_actions.lock().clear();
    }

    /// Full and targeted fetches attempted so far.
    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }

    fn begin_fetch(&self) -> SourceResult<()> {
        *self.fetches.lock() += 1;
        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(SourceError::Unavailable {
                source_id: self.id.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ScmSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(
        &self,
        criteria: Option<&dyn HeadCriteria>,
        observer: &mut dyn HeadObserver,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<()> {
        self.begin_fetch()?;
        let heads: Vec<(Head, Revision)> = self.state.read().heads.values().cloned().collect();
        for (head, revision) in heads {
            if !observer.is_observing() {
                break;
            }
            offer(criteria, observer, head, revision);
        }
        Ok(())
    }

    fn fetch_event(
        &self,
        criteria: Option<&dyn HeadCriteria>,
        observer: &mut dyn HeadObserver,
        event: &HeadEvent,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<()> {
        let wanted = event.heads_for(&self.id);
        if wanted.is_empty() {
            return Ok(());
        }
        self.begin_fetch()?;
        let found: Vec<(Head, Revision)> = {
            let state = self.state.read();
            wanted
                .iter()
                .filter_map(|h| state.heads.get(&h.head.name).cloned())
                .collect()
        };
        for (head, revision) in found {
            offer(criteria, observer, head, revision);
        }
        Ok(())
    }

    fn build(&self, head: &Head, _revision: &Revision) -> ScmRef {
        ScmRef::new("memory", &self.id, &head.name)
    }

    fn fetch_actions(
        &self,
        head: &Head,
        _revision: &Revision,
        _event: Option<&HeadEvent>,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<Vec<Action>> {
        if self.failing_actions.lock().contains(&head.name) {
            return Err(SourceError::Unavailable {
                source_id: self.id.clone(),
                reason: format!("metadata for '{}' unavailable", head.name),
            });
        }
        Ok(self
            .state
            .read()
            .head_actions
            .get(&head.name)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_source_actions(
        &self,
        _event: Option<&SourceEvent>,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<Vec<Action>> {
        Ok(self.state.read().source_actions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, SourceMatch};
    use crate::progress::BufferedProgress;

    #[derive(Default)]
    struct Names(Vec<String>);

    impl HeadObserver for Names {
        fn observe(&mut self, head: Head, _revision: Revision) {
            self.0.push(head.name);
        }
    }

    #[test]
    fn fetch_reports_heads_in_name_order() {
        let source = MemorySource::new("a")
            .with_branch("main", "1")
            .with_branch("dev", "2");
        let mut names = Names::default();
        source
            .fetch(None, &mut names, &BufferedProgress::new())
            .unwrap();
        assert_eq!(names.0, vec!["dev", "main"]);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let source = MemorySource::new("a").with_branch("main", "1");
        source.fail_next(1);
        let progress = BufferedProgress::new();
        assert!(source.fetch(None, &mut Names::default(), &progress).is_err());
        assert!(source.fetch(None, &mut Names::default(), &progress).is_ok());
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn targeted_event_fetch() {
        let source = MemorySource::new("a")
            .with_branch("main", "1")
            .with_branch("dev", "2");
        let event = HeadEvent::new(EventKind::Updated, "hook", SourceMatch::All)
            .with_head(Head::branch("main"), None)
            .with_head(Head::branch("gone"), None);
        let mut names = Names::default();
        source
            .fetch_event(None, &mut names, &event, &BufferedProgress::new())
            .unwrap();
        assert_eq!(names.0, vec!["main"]);
    }

    #[test]
    fn head_actions() {
        let source = MemorySource::new("a").with_branch("main", "1");
        source.set_head_actions("main", vec![Action::new("display_name", "Main")]);
        let progress = BufferedProgress::new();
        let head = Head::branch("main");
        let rev = Revision::new("1");
        assert_eq!(
            source.fetch_actions(&head, &rev, None, &progress).unwrap().len(),
            1
        );
        source.fail_actions_for("main");
        assert!(source.fetch_actions(&head, &rev, None, &progress).is_err());
    }
}
