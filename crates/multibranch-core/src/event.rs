use crate::error::{ReconcileError, Result};
use crate::types::{BuildCause, Head, HeadKind, Revision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Removed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Removed => "removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ReconcileError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" | "create" => Ok(EventKind::Created),
            "updated" | "update" => Ok(EventKind::Updated),
            "removed" | "remove" | "deleted" => Ok(EventKind::Removed),
            _ => Err(ReconcileError::InvalidConfig(format!(
                "unknown event kind '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceMatch
// ---------------------------------------------------------------------------

/// Which configured sources an event concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceMatch {
    All,
    Ids { ids: BTreeSet<String> },
}

impl SourceMatch {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SourceMatch::Ids {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_match(&self, source_id: &str) -> bool {
        match self {
            SourceMatch::All => true,
            SourceMatch::Ids { ids } => ids.contains(source_id),
        }
    }
}

// ---------------------------------------------------------------------------
// HeadEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHead {
    pub head: Head,
    /// The revision the event payload claims, if any. Sources are still asked
    /// for the authoritative value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
}

impl EventHead {
    /// Parse `NAME` or `NAME=REVISION`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, revision) = match spec.split_once('=') {
            Some((name, rev)) => (name, Some(Revision::new(rev))),
            None => (spec, None),
        };
        if name.is_empty() || revision.as_ref().is_some_and(|r| r.hash.is_empty()) {
            return Err(ReconcileError::InvalidHeadSpec(spec.to_string()));
        }
        Ok(Self {
            head: Head {
                name: name.to_string(),
                kind: HeadKind::Branch,
            },
            revision,
        })
    }
}

/// A change to one or more heads, scoped to the sources it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub origin: String,
    pub timestamp: DateTime<Utc>,
    pub sources: SourceMatch,
    pub heads: Vec<EventHead>,
}

impl HeadEvent {
    pub fn new(kind: EventKind, origin: impl Into<String>, sources: SourceMatch) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            origin: origin.into(),
            timestamp: Utc::now(),
            sources,
            heads: Vec::new(),
        }
    }

    pub fn with_head(mut self, head: Head, revision: Option<Revision>) -> Self {
        self.heads.push(EventHead { head, revision });
        self
    }

    pub fn is_match(&self, source_id: &str) -> bool {
        self.sources.is_match(source_id)
    }

    /// The heads this event names for a source. Empty when the source does
    /// not match.
    pub fn heads_for(&self, source_id: &str) -> &[EventHead] {
        if self.is_match(source_id) {
            &self.heads
        } else {
            &[]
        }
    }

    pub fn head_names(&self) -> BTreeSet<&str> {
        self.heads.iter().map(|h| h.head.name.as_str()).collect()
    }

    pub fn description(&self) -> String {
        let names: Vec<&str> = self.heads.iter().map(|h| h.head.name.as_str()).collect();
        format!("{} event for {}", capitalize(self.kind.as_str()), names.join(", "))
    }

    pub fn cause(&self) -> BuildCause {
        BuildCause::BranchEvent {
            origin: self.origin.clone(),
            description: self.description(),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// SourceEvent
// ---------------------------------------------------------------------------

/// Source-level metadata changed (repository renamed, description edited).
/// Never touches branch liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub id: Uuid,
    pub origin: String,
    pub timestamp: DateTime<Utc>,
    pub sources: SourceMatch,
    #[serde(default)]
    pub description: String,
}

impl SourceEvent {
    pub fn new(origin: impl Into<String>, sources: SourceMatch) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: origin.into(),
            timestamp: Utc::now(),
            sources,
            description: String::new(),
        }
    }

    pub fn is_match(&self, source_id: &str) -> bool {
        self.sources.is_match(source_id)
    }
}

// ---------------------------------------------------------------------------
// ScmEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScmEvent {
    Head(HeadEvent),
    Source(SourceEvent),
}

impl ScmEvent {
    pub fn id(&self) -> Uuid {
        match self {
            ScmEvent::Head(e) => e.id,
            ScmEvent::Source(e) => e.id,
        }
    }
}

impl From<HeadEvent> for ScmEvent {
    fn from(e: HeadEvent) -> Self {
        ScmEvent::Head(e)
    }
}

impl From<SourceEvent> for ScmEvent {
    fn from(e: SourceEvent) -> Self {
        ScmEvent::Source(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_head_specs() {
        let h = EventHead::parse("main=abc").unwrap();
        assert_eq!(h.head.name, "main");
        assert_eq!(h.revision, Some(Revision::new("abc")));

        let h = EventHead::parse("feature/x").unwrap();
        assert!(h.revision.is_none());

        assert!(EventHead::parse("").is_err());
        assert!(EventHead::parse("=abc").is_err());
        assert!(EventHead::parse("main=").is_err());
    }

    #[test]
    fn heads_scoped_to_matching_sources() {
        let event = HeadEvent::new(EventKind::Updated, "hook", SourceMatch::ids(["a"]))
            .with_head(Head::branch("main"), None);
        assert_eq!(event.heads_for("a").len(), 1);
        assert!(event.heads_for("b").is_empty());
        assert!(SourceMatch::All.is_match("anything"));
    }

    #[test]
    fn event_cause_describes_heads() {
        let event = HeadEvent::new(EventKind::Created, "hook", SourceMatch::All)
            .with_head(Head::branch("main"), None)
            .with_head(Head::branch("dev"), None);
        match event.cause() {
            BuildCause::BranchEvent {
                origin,
                description,
            } => {
                assert_eq!(origin, "hook");
                assert_eq!(description, "Created event for main, dev");
            }
            other => panic!("unexpected cause {other:?}"),
        }
    }

    #[test]
    fn event_kind_from_str() {
        assert_eq!("removed".parse::<EventKind>().unwrap(), EventKind::Removed);
        assert_eq!("create".parse::<EventKind>().unwrap(), EventKind::Created);
        assert!("moved".parse::<EventKind>().is_err());
    }

    #[test]
    fn scm_event_json_tagged() {
        let event: ScmEvent = SourceEvent::new("hook", SourceMatch::All).into();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"source\""));
        let parsed: ScmEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), event.id());
    }
}
