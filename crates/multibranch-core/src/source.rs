use crate::criteria::HeadCriteria;
use crate::error::SourceError;
use crate::event::{HeadEvent, SourceEvent};
use crate::progress::ProgressSink;
use crate::property::PropertyStrategy;
use crate::strategy::BuildStrategy;
use crate::types::{Action, Head, Revision, ScmRef};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

// ---------------------------------------------------------------------------
// HeadObserver
// ---------------------------------------------------------------------------

/// Receives `(head, revision)` pairs from a source while it fetches.
pub trait HeadObserver {
    fn observe(&mut self, head: Head, revision: Revision);

    /// Sources stop early once this turns false.
    fn is_observing(&self) -> bool {
        true
    }

    /// Head names the observer cares about; `None` means all of them.
    fn includes(&self) -> Option<&BTreeSet<String>> {
        None
    }
}

/// Offer one head to an observer, honouring its includes and the criteria.
/// Source implementations call this for every head they enumerate.
pub fn offer(
    criteria: Option<&dyn HeadCriteria>,
    observer: &mut dyn HeadObserver,
    head: Head,
    revision: Revision,
) {
    if let Some(includes) = observer.includes() {
        if !includes.contains(&head.name) {
            return;
        }
    }
    if let Some(criteria) = criteria {
        if !criteria.is_head(&head, &revision) {
            tracing::debug!("{} {} does not meet criteria", head.pronoun(), head.name);
            return;
        }
    }
    observer.observe(head, revision);
}

struct EventFilter<'a> {
    inner: &'a mut dyn HeadObserver,
    wanted: BTreeSet<String>,
}

impl HeadObserver for EventFilter<'_> {
    fn observe(&mut self, head: Head, revision: Revision) {
        if self.wanted.contains(&head.name) {
            self.inner.observe(head, revision);
        }
    }

    fn is_observing(&self) -> bool {
        self.inner.is_observing()
    }

    fn includes(&self) -> Option<&BTreeSet<String>> {
        Some(&self.wanted)
    }
}

// ---------------------------------------------------------------------------
// ScmSource
// ---------------------------------------------------------------------------

/// A repository that can enumerate its heads.
///
/// Every method may block on network I/O.
pub trait ScmSource: Send + Sync {
    fn id(&self) -> &str;

    /// Report every current head to `observer`.
    fn fetch(
        &self,
        criteria: Option<&dyn HeadCriteria>,
        observer: &mut dyn HeadObserver,
        progress: &dyn ProgressSink,
    ) -> SourceResult<()>;

    /// Report only the heads `event` concerns. The default runs a full fetch
    /// and filters it; sources with a cheaper targeted lookup override it.
    fn fetch_event(
        &self,
        criteria: Option<&dyn HeadCriteria>,
        observer: &mut dyn HeadObserver,
        event: &HeadEvent,
        progress: &dyn ProgressSink,
    ) -> SourceResult<()> {
        let wanted: BTreeSet<String> = event
            .heads_for(self.id())
            .iter()
            .map(|h| h.head.name.clone())
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let mut filtered = EventFilter {
            inner: observer,
            wanted,
        };
        self.fetch(criteria, &mut filtered, progress)
    }

    /// The checkout reference a child project uses for this head.
    fn build(&self, head: &Head, revision: &Revision) -> ScmRef;

    fn fetch_actions(
        &self,
        _head: &Head,
        _revision: &Revision,
        _event: Option<&HeadEvent>,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<Vec<Action>> {
        Ok(Vec::new())
    }

    fn fetch_source_actions(
        &self,
        _event: Option<&SourceEvent>,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<Vec<Action>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// BranchSource
// ---------------------------------------------------------------------------

/// A configured source. Its position in the container's list is its
/// priority: index 0 wins every conflict.
#[derive(Clone)]
pub struct BranchSource {
    pub source: Arc<dyn ScmSource>,
    pub properties: PropertyStrategy,
    pub build_strategies: Vec<Arc<dyn BuildStrategy>>,
}

impl BranchSource {
    pub fn new(source: Arc<dyn ScmSource>) -> Self {
        Self {
            source,
            properties: PropertyStrategy::default(),
            build_strategies: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: PropertyStrategy) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_build_strategies(mut self, strategies: Vec<Arc<dyn BuildStrategy>>) -> Self {
        self.build_strategies = strategies;
        self
    }

    pub fn id(&self) -> &str {
        self.source.id()
    }
}

impl fmt::Debug for BranchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchSource")
            .field("id", &self.id())
            .field("properties", &self.properties)
            .field("build_strategies", &self.build_strategies)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::WildcardFilter;
    use crate::event::{EventKind, SourceMatch};
    use crate::progress::BufferedProgress;

    #[derive(Default)]
    struct Collect {
        seen: Vec<String>,
        includes: Option<BTreeSet<String>>,
    }

    impl HeadObserver for Collect {
        fn observe(&mut self, head: Head, _revision: Revision) {
            self.seen.push(head.name);
        }

        fn includes(&self) -> Option<&BTreeSet<String>> {
            self.includes.as_ref()
        }
    }

    struct Fixed;

    impl ScmSource for Fixed {
        fn id(&self) -> &str {
            "fixed"
        }

        fn fetch(
            &self,
            criteria: Option<&dyn HeadCriteria>,
            observer: &mut dyn HeadObserver,
            _progress: &dyn ProgressSink,
        ) -> SourceResult<()> {
            for name in ["main", "dev", "wip/x"] {
                offer(criteria, observer, Head::branch(name), Revision::new("1"));
            }
            Ok(())
        }

        fn build(&self, head: &Head, _revision: &Revision) -> ScmRef {
            ScmRef::new("test", "fixed", &head.name)
        }
    }

    #[test]
    fn offer_applies_criteria() {
        let filter = WildcardFilter::new("*", "wip/*").unwrap();
        let mut obs = Collect::default();
        Fixed
            .fetch(Some(&filter), &mut obs, &BufferedProgress::new())
            .unwrap();
        assert_eq!(obs.seen, vec!["main", "dev"]);
    }

    #[test]
    fn offer_applies_includes() {
        let mut obs = Collect {
            includes: Some(BTreeSet::from(["dev".to_string()])),
            ..Default::default()
        };
        Fixed.fetch(None, &mut obs, &BufferedProgress::new()).unwrap();
        assert_eq!(obs.seen, vec!["dev"]);
    }

    #[test]
    fn default_event_fetch_filters_to_event_heads() {
        let event = HeadEvent::new(EventKind::Updated, "hook", SourceMatch::All)
            .with_head(Head::branch("dev"), None);
        let mut obs = Collect::default();
        Fixed
            .fetch_event(None, &mut obs, &event, &BufferedProgress::new())
            .unwrap();
        assert_eq!(obs.seen, vec!["dev"]);
    }

    #[test]
    fn default_event_fetch_skips_unmatched_source() {
        let event = HeadEvent::new(EventKind::Updated, "hook", SourceMatch::ids(["other"]))
            .with_head(Head::branch("dev"), None);
        let mut obs = Collect::default();
        Fixed
            .fetch_event(None, &mut obs, &event, &BufferedProgress::new())
            .unwrap();
        assert!(obs.seen.is_empty());
    }
}
