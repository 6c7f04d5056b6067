use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// HeadKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeadKind {
    Branch,
    Tag {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    ChangeRequest {
        id: String,
        target: String,
    },
}

impl HeadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadKind::Branch => "branch",
            HeadKind::Tag { .. } => "tag",
            HeadKind::ChangeRequest { .. } => "change_request",
        }
    }
}

impl Default for HeadKind {
    fn default() -> Self {
        HeadKind::Branch
    }
}

// ---------------------------------------------------------------------------
// Head
// ---------------------------------------------------------------------------

/// A named ref reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Head {
    pub name: String,
    #[serde(default)]
    pub kind: HeadKind,
}

impl Head {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: HeadKind::Branch,
        }
    }

    pub fn tag(name: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            kind: HeadKind::Tag { timestamp },
        }
    }

    pub fn change_request(
        name: impl Into<String>,
        id: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: HeadKind::ChangeRequest {
                id: id.into(),
                target: target.into(),
            },
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.kind, HeadKind::Tag { .. })
    }

    pub fn is_change_request(&self) -> bool {
        matches!(self.kind, HeadKind::ChangeRequest { .. })
    }

    /// The word used when talking about this head in logs.
    pub fn pronoun(&self) -> &'static str {
        match self.kind {
            HeadKind::Branch => "Branch",
            HeadKind::Tag { .. } => "Tag",
            HeadKind::ChangeRequest { .. } => "Change request",
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision {
    pub hash: String,
    /// Deterministic revisions can be compared directly. Anything else has
    /// to be asked of a `ChangePoller`.
    #[serde(default = "default_deterministic")]
    pub deterministic: bool,
}

fn default_deterministic() -> bool {
    true
}

impl Revision {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            deterministic: true,
        }
    }

    pub fn non_deterministic(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            deterministic: false,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

// ---------------------------------------------------------------------------
// ScmRef
// ---------------------------------------------------------------------------

/// What a child project checks out: handed out by `ScmSource::build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmRef {
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
}

impl ScmRef {
    pub fn new(
        kind: impl Into<String>,
        remote: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            remote: remote.into(),
            reference: reference.into(),
        }
    }

    /// The no-op reference carried by dead branches.
    pub fn none() -> Self {
        Self {
            kind: "none".to_string(),
            remote: String::new(),
            reference: String::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == "none"
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A piece of metadata a source attaches to a head or to itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub value: String,
}

impl Action {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildCause
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildCause {
    /// Triggered by a full scan.
    BranchIndexing,
    /// Triggered by an incoming source event.
    BranchEvent { origin: String, description: String },
    Manual { user: String },
    /// A cause type supplied by the host that this crate knows nothing about.
    Other { kind: String },
}

impl BuildCause {
    pub fn as_str(&self) -> &str {
        match self {
            BuildCause::BranchIndexing => "branch_indexing",
            BuildCause::BranchEvent { .. } => "branch_event",
            BuildCause::Manual { .. } => "manual",
            BuildCause::Other { kind } => kind,
        }
    }
}

impl fmt::Display for BuildCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildCause::BranchIndexing => f.write_str("Branch indexing"),
            BuildCause::BranchEvent {
                origin,
                description,
            } => write!(f, "{description} (from {origin})"),
            BuildCause::Manual { user } => write!(f, "Started by {user}"),
            BuildCause::Other { kind } => f.write_str(kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_pronouns() {
        assert_eq!(Head::branch("main").pronoun(), "Branch");
        assert_eq!(Head::tag("v1.0", None).pronoun(), "Tag");
        assert_eq!(
            Head::change_request("PR-4", "4", "main").pronoun(),
            "Change request"
        );
    }

    #[test]
    fn head_kind_defaults_to_branch() {
        let head: Head = serde_yaml::from_str("name: develop\n").unwrap();
        assert_eq!(head, Head::branch("develop"));
    }

    #[test]
    fn revision_deterministic_by_default() {
        let rev: Revision = serde_yaml::from_str("hash: abc123\n").unwrap();
        assert!(rev.deterministic);
        assert_eq!(rev.to_string(), "abc123");
    }

    #[test]
    fn head_kind_tagged_yaml() {
        let head = Head::change_request("PR-7", "7", "main");
        let yaml = serde_yaml::to_string(&head).unwrap();
        assert!(yaml.contains("type: change_request"));
        let parsed: Head = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, head);
    }

    #[test]
    fn null_scm_ref() {
        assert!(ScmRef::none().is_none());
        assert!(!ScmRef::new("git", "origin", "refs/heads/main").is_none());
    }

    #[test]
    fn cause_names() {
        assert_eq!(BuildCause::BranchIndexing.as_str(), "branch_indexing");
        assert_eq!(
            BuildCause::Other {
                kind: "timer".to_string()
            }
            .as_str(),
            "timer"
        );
    }
}
