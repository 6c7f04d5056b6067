use super::pass::{Pass, PassOutput, Scope};
use super::{check_unique_ids, PassEnv};
use crate::error::Result;
use crate::event::{HeadEvent, SourceEvent};
use crate::report::FailedSource;

/// Reconcile only the heads and sources an event names.
///
/// Sources the event does not match are not asked anything and are assumed
/// unchanged. Children are only marked dead when their owner was asked and
/// answered without them, and never by a create event.
pub fn reconcile_event(env: PassEnv<'_>, event: &HeadEvent) -> Result<PassOutput> {
    env.progress
        .phase(&format!("{} (event {})", event.description(), event.id));
    if event.heads.is_empty() {
        tracing::debug!(event = %event.id, "event names no heads");
        return Ok(PassOutput::default());
    }
    let output = Pass::new(env, Scope::Event(event)).run()?;
    env.progress.phase(&format!(
        "Finished processing event {}: {} decisions",
        event.id,
        output.staged.len()
    ));
    Ok(output)
}

/// Refresh source-level metadata for the sources a source event matches.
/// Branches are not looked at.
pub fn refresh_source_actions(env: PassEnv<'_>, event: &SourceEvent) -> Result<PassOutput> {
    check_unique_ids(env.sources)?;
    env.progress
        .phase(&format!("Refreshing source metadata (event {})", event.id));
    let mut output = PassOutput::default();
    for source in env.sources.iter().filter(|s| event.is_match(s.id())) {
        env.cancel.check()?;
        match source.source.fetch_source_actions(Some(event), env.progress) {
            Ok(actions) => {
                output
                    .source_actions
                    .insert(source.id().to_string(), actions);
            }
            Err(e) => {
                tracing::warn!(source = source.id(), "could not refresh source metadata: {e}");
                output.failed_sources.push(FailedSource {
                    id: source.id().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    env.cancel.check()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Branch;
    use crate::event::{EventKind, SourceMatch};
    use crate::poll::HashPoller;
    use crate::progress::BufferedProgress;
    use crate::project::{Child, ChildProject, DefaultProjectFactory};
    use crate::reconcile::Cancellation;
    use crate::report::Change;
    use crate::source::BranchSource;
    use crate::sources::MemorySource;
    use crate::types::{Action, Head, Revision, ScmRef};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn run(
        sources: &[BranchSource],
        children: &BTreeMap<String, Child>,
        event: &HeadEvent,
    ) -> PassOutput {
        let progress = BufferedProgress::new();
        let cancel = Cancellation::new();
        reconcile_event(
            PassEnv {
                sources,
                children,
                factory: &DefaultProjectFactory,
                poller: &HashPoller,
                criteria: None,
                progress: &progress,
                cancel: &cancel,
                now: Utc::now(),
            },
            event,
        )
        .unwrap()
    }

    fn child(source: &str, name: &str, rev: &str) -> (String, Child) {
        let mut project = ChildProject::new(
            name,
            Branch::live(
                source,
                Head::branch(name),
                ScmRef::new("memory", source, name),
                Vec::new(),
                Vec::new(),
            ),
        );
        project.last_seen = Some(Revision::new(rev));
        (name.to_string(), Child::Project(project))
    }

    #[test]
    fn unmatched_sources_are_not_fetched() {
        let a = Arc::new(MemorySource::new("a").with_branch("main", "1"));
        let b = Arc::new(MemorySource::new("b").with_branch("dev", "1"));
        let sources = vec![BranchSource::new(a.clone()), BranchSource::new(b.clone())];
        let event = HeadEvent::new(EventKind::Created, "hook", SourceMatch::ids(["b"]))
            .with_head(Head::branch("dev"), None);
        let out = run(&sources, &BTreeMap::new(), &event);
        assert_eq!(a.fetch_count(), 0);
        assert_eq!(b.fetch_count(), 1);
        assert_eq!(out.staged.len(), 1);
        assert_eq!(out.staged[0].change, Change::Created);
    }

    #[test]
    fn removed_event_kills_only_matched_owner() {
        let a = Arc::new(MemorySource::new("a"));
        let b = Arc::new(MemorySource::new("b"));
        let sources = vec![BranchSource::new(a), BranchSource::new(b)];
        let children: BTreeMap<_, _> = [child("a", "main", "1"), child("b", "dev", "1")]
            .into_iter()
            .collect();
        let event = HeadEvent::new(EventKind::Removed, "hook", SourceMatch::ids(["a"]))
            .with_head(Head::branch("main"), None)
            .with_head(Head::branch("dev"), None);
        let out = run(&sources, &children, &event);
        assert_eq!(out.staged.len(), 1);
        assert_eq!(out.staged[0].project.name, "main");
        assert_eq!(out.staged[0].change, Change::Dead);
    }

    #[test]
    fn created_event_ignores_live_children() {
        let a = Arc::new(MemorySource::new("a").with_branch("main", "2"));
        let sources = vec![BranchSource::new(a)];
        let children: BTreeMap<_, _> = [child("a", "main", "1")].into_iter().collect();
        let event = HeadEvent::new(EventKind::Created, "hook", SourceMatch::All)
            .with_head(Head::branch("main"), None);
        let out = run(&sources, &children, &event);
        assert!(out.staged.is_empty());
    }

    #[test]
    fn empty_event_does_nothing() {
        let a = Arc::new(MemorySource::new("a").with_branch("main", "1"));
        let sources = vec![BranchSource::new(a.clone())];
        let event = HeadEvent::new(EventKind::Updated, "hook", SourceMatch::All);
        let out = run(&sources, &BTreeMap::new(), &event);
        assert!(out.staged.is_empty());
        assert_eq!(a.fetch_count(), 0);
    }

    #[test]
    fn source_event_refreshes_metadata_only() {
        let a = Arc::new(MemorySource::new("a").with_branch("main", "1"));
        a.set_source_actions(vec![Action::new("description", "mirror")]);
        let sources = vec![BranchSource::new(a.clone())];
        let children = BTreeMap::new();
        let progress = BufferedProgress::new();
        let cancel = Cancellation::new();
        let out = refresh_source_actions(
            PassEnv {
                sources: &sources,
                children: &children,
                factory: &DefaultProjectFactory,
                poller: &HashPoller,
                criteria: None,
                progress: &progress,
                cancel: &cancel,
                now: Utc::now(),
            },
            &SourceEvent::new("hook", SourceMatch::All),
        )
        .unwrap();
        assert!(out.staged.is_empty());
        assert_eq!(out.source_actions["a"], vec![Action::new("description", "mirror")]);
        assert_eq!(a.fetch_count(), 0);
    }
}
