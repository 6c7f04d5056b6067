//! Live/Dead transitions for branch projects.
//!
//! Both reconciliation paths classify every observation through
//! [`classify`] and decide build evaluation through
//! [`needs_build_evaluation`], so a full scan and an event agree on what a
//! given observation means.

use crate::branch::Branch;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// No child exists for this name yet.
    Create,
    /// The child is dead and a source reports the head again.
    Reopen,
    /// The child is live under a different source.
    Takeover,
    /// The child is live under the same source.
    Refresh,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Create => "create",
            Transition::Reopen => "reopen",
            Transition::Takeover => "takeover",
            Transition::Refresh => "refresh",
        }
    }

    /// Reopen and takeover replace the owning source.
    pub fn changes_owner(self) -> bool {
        matches!(self, Transition::Reopen | Transition::Takeover)
    }
}

pub fn classify(existing: Option<&Branch>, observed_source: &str) -> Transition {
    match existing {
        None => Transition::Create,
        Some(branch) if branch.is_dead() => Transition::Reopen,
        Some(branch) if branch.source_id() != observed_source => Transition::Takeover,
        Some(_) => Transition::Refresh,
    }
}

/// Creation, reopen and takeover always go through the build gate; a refresh
/// only when the revision moved.
pub fn needs_build_evaluation(transition: Transition, revision_changed: bool) -> bool {
    match transition {
        Transition::Create | Transition::Reopen | Transition::Takeover => true,
        Transition::Refresh => revision_changed,
    }
}

/// Live -> Dead. Keeps head, properties and actions; drops the source.
pub fn kill(branch: &Branch) -> Branch {
    match branch {
        Branch::Live {
            head,
            properties,
            actions,
            ..
        } => Branch::Dead {
            head: head.clone(),
            properties: properties.clone(),
            actions: actions.clone(),
        },
        dead @ Branch::Dead { .. } => dead.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::DEAD_SOURCE_ID;
    use crate::property::{BranchProperty, SuppressionStrategy};
    use crate::types::{Action, Head, ScmRef};

    fn live(source: &str) -> Branch {
        Branch::live(
            source,
            Head::branch("main"),
            ScmRef::new("git", "r", "refs/heads/main"),
            vec![BranchProperty::SuppressAutomaticTriggering {
                strategy: SuppressionStrategy::Events,
            }],
            vec![Action::new("url", "https://example.test/main")],
        )
    }

    #[test]
    fn classify_covers_every_case() {
        assert_eq!(classify(None, "a"), Transition::Create);
        assert_eq!(classify(Some(&live("a")), "a"), Transition::Refresh);
        assert_eq!(classify(Some(&live("a")), "b"), Transition::Takeover);
        assert_eq!(classify(Some(&kill(&live("a"))), "a"), Transition::Reopen);
    }

    #[test]
    fn kill_preserves_head_and_properties() {
        let branch = live("a");
        let dead = kill(&branch);
        assert!(dead.is_dead());
        assert_eq!(dead.source_id(), DEAD_SOURCE_ID);
        assert_eq!(dead.head(), branch.head());
        assert_eq!(dead.properties(), branch.properties());
        assert_eq!(dead.actions(), branch.actions());
        assert!(kill(&dead).content_eq(&dead));
    }

    #[test]
    fn reopen_always_evaluated() {
        assert!(needs_build_evaluation(Transition::Reopen, false));
        assert!(needs_build_evaluation(Transition::Takeover, false));
        assert!(needs_build_evaluation(Transition::Create, false));
        assert!(!needs_build_evaluation(Transition::Refresh, false));
        assert!(needs_build_evaluation(Transition::Refresh, true));
    }
}
