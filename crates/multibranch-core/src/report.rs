use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    Created,
    /// Resurrected from dead or taken over from another source.
    Reopened { from: String },
    /// New revision.
    Updated,
    /// Same revision, different properties, actions or reference.
    Metadata,
    Unchanged,
    Dead,
    Skipped { reason: String },
}

impl Change {
    pub fn as_str(&self) -> &'static str {
        match self {
            Change::Created => "created",
            Change::Reopened { .. } => "reopened",
            Change::Updated => "updated",
            Change::Metadata => "metadata",
            Change::Unchanged => "unchanged",
            Change::Dead => "dead",
            Change::Skipped { .. } => "skipped",
        }
    }

    /// Whether this change has to be written back.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Change::Unchanged | Change::Skipped { .. })
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Reopened { from } => write!(f, "reopened (was {from})"),
            Change::Skipped { reason } => write!(f, "skipped: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildOutcome {
    NotRequested,
    Suppressed,
    Scheduled,
    /// The scheduler refused; the revision was not recorded as built.
    Rejected,
    /// The decision itself failed, for example on an unknown build cause.
    Error { message: String },
}

impl BuildOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildOutcome::NotRequested => "not_requested",
            BuildOutcome::Suppressed => "suppressed",
            BuildOutcome::Scheduled => "scheduled",
            BuildOutcome::Rejected => "rejected",
            BuildOutcome::Error { .. } => "error",
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Error { message } => write!(f, "error: {message}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildOutcome {
    /// Encoded name.
    pub name: String,
    /// Raw branch name.
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub change: Change,
    pub build: BuildOutcome,
    #[serde(default = "default_persisted")]
    pub persisted: bool,
}

fn default_persisted() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSource {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<ChildOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_sources: Vec<FailedSource>,
}

impl ReconcileReport {
    pub fn outcome(&self, name: &str) -> Option<&ChildOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Outcome for a raw branch name.
    pub fn for_branch(&self, branch: &str) -> Option<&ChildOutcome> {
        self.outcomes.iter().find(|o| o.branch == branch)
    }

    /// Encoded names whose build the scheduler accepted.
    pub fn scheduled(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.build == BuildOutcome::Scheduled)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn mutations(&self) -> usize {
        self.outcomes.iter().filter(|o| o.change.is_mutation()).count()
    }

    /// Nothing created, changed, killed or built.
    pub fn is_noop(&self) -> bool {
        self.mutations() == 0 && self.scheduled().is_empty()
    }

    pub fn errors(&self) -> Vec<&ChildOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.build, BuildOutcome::Error { .. }) || !o.persisted)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, change: Change, build: BuildOutcome) -> ChildOutcome {
        ChildOutcome {
            name: name.to_string(),
            branch: name.to_string(),
            source_id: Some("a".to_string()),
            change,
            build,
            persisted: true,
        }
    }

    #[test]
    fn summaries() {
        let report = ReconcileReport {
            outcomes: vec![
                outcome("main", Change::Created, BuildOutcome::Scheduled),
                outcome("dev", Change::Unchanged, BuildOutcome::NotRequested),
                outcome(
                    "x",
                    Change::Skipped {
                        reason: "owned elsewhere".to_string(),
                    },
                    BuildOutcome::NotRequested,
                ),
            ],
            failed_sources: Vec::new(),
        };
        assert_eq!(report.scheduled(), vec!["main"]);
        assert_eq!(report.mutations(), 1);
        assert!(!report.is_noop());
        assert_eq!(report.for_branch("dev").unwrap().change, Change::Unchanged);
    }

    #[test]
    fn json_is_tagged() {
        let o = outcome(
            "main",
            Change::Reopened {
                from: "::dead::".to_string(),
            },
            BuildOutcome::Scheduled,
        );
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["change"]["type"], "reopened");
        assert_eq!(json["build"]["type"], "scheduled");
    }
}
