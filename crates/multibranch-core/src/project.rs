use crate::branch::Branch;
use crate::property::BranchProperty;
use crate::types::Revision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// How many builds of a child to keep. Set by `ProjectFactory::decorate`
/// from the branch's `BuildRetention` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_keep: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_to_keep: Option<u32>,
}

// ---------------------------------------------------------------------------
// ChildProject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildProject {
    /// Encoded name, unique within the container.
    pub name: String,
    pub branch: Branch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Revision of the last build that was accepted by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_built: Option<Revision>,
    /// Revision most recently observed, built or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Revision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_since: Option<DateTime<Utc>>,
}

impl ChildProject {
    pub fn new(name: impl Into<String>, branch: Branch) -> Self {
        Self {
            name: name.into(),
            branch,
            display_name: None,
            last_built: None,
            last_seen: None,
            retention: None,
            dead_since: None,
        }
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn is_dead(&self) -> bool {
        self.branch.is_dead()
    }

    /// Raw (unencoded) branch name.
    pub fn branch_name(&self) -> &str {
        self.branch.name()
    }
}

// ---------------------------------------------------------------------------
// Child
// ---------------------------------------------------------------------------

/// Whatever lives under an encoded name in the container.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Project(ChildProject),
    /// Something this crate did not create. Never touched by reconciliation.
    Unrecognized { name: String, kind: String },
}

impl Child {
    pub fn name(&self) -> &str {
        match self {
            Child::Project(p) => &p.name,
            Child::Unrecognized { name, .. } => name,
        }
    }

    pub fn as_project(&self) -> Option<&ChildProject> {
        match self {
            Child::Project(p) => Some(p),
            Child::Unrecognized { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectFactory
// ---------------------------------------------------------------------------

/// Creates and decorates child projects. Nothing here persists; saving is
/// the caller's job once a pass commits.
pub trait ProjectFactory: Send + Sync {
    fn new_instance(&self, name: &str, branch: Branch) -> ChildProject {
        ChildProject::new(name, branch)
    }

    fn is_project(&self, candidate: &Child) -> bool {
        matches!(candidate, Child::Project(_))
    }

    fn branch<'a>(&self, project: &'a ChildProject) -> &'a Branch {
        &project.branch
    }

    fn set_branch(&self, project: &mut ChildProject, branch: Branch) {
        project.branch = branch;
    }

    fn revision<'a>(&self, project: &'a ChildProject) -> Option<&'a Revision> {
        project.last_built.as_ref()
    }

    fn set_revision_hash(&self, project: &mut ChildProject, built: Revision) {
        project.last_built = Some(built);
    }

    fn last_seen_revision<'a>(&self, project: &'a ChildProject) -> Option<&'a Revision> {
        project.last_seen.as_ref()
    }

    fn set_last_seen_revision(&self, project: &mut ChildProject, seen: Revision) {
        project.last_seen = Some(seen);
    }

    /// Apply the current branch to derived child settings.
    fn decorate(&self, project: &mut ChildProject);
}

/// Applies build retention and display name from the branch.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProjectFactory;

impl ProjectFactory for DefaultProjectFactory {
    fn decorate(&self, project: &mut ChildProject) {
        project.retention = project.branch.properties().iter().find_map(|p| match p {
            BranchProperty::BuildRetention {
                days_to_keep,
                num_to_keep,
            } => Some(Retention {
                days_to_keep: *days_to_keep,
                num_to_keep: *num_to_keep,
            }),
            _ => None,
        });
        project.display_name = project
            .branch
            .actions()
            .iter()
            .find(|a| a.name == "display_name")
            .map(|a| a.value.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
