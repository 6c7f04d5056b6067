use crate::property::BranchProperty;
use crate::types::{Action, Head, ScmRef};
use serde::{Deserialize, Serialize};

/// Source id carried by every dead branch.
pub const DEAD_SOURCE_ID: &str = "::dead::";

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// The branch a child project currently represents.
///
/// Identity is `(source_id, head name)`: two values reporting different
/// revisions, properties or actions for the same head of the same source are
/// the same branch. Use [`Branch::content_eq`] to compare every field.
///
/// A branch is never mutated in place. Reconciliation builds a new value and
/// replaces the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Branch {
    Live {
        source_id: String,
        head: Head,
        scm: ScmRef,
        #[serde(default)]
        properties: Vec<BranchProperty>,
        #[serde(default)]
        actions: Vec<Action>,
    },
    /// No configured source reports this head any more.
    Dead {
        head: Head,
        #[serde(default)]
        properties: Vec<BranchProperty>,
        #[serde(default)]
        actions: Vec<Action>,
    },
}

impl Branch {
    pub fn live(
        source_id: impl Into<String>,
        head: Head,
        scm: ScmRef,
        properties: Vec<BranchProperty>,
        actions: Vec<Action>,
    ) -> Self {
        Branch::Live {
            source_id: source_id.into(),
            head,
            scm,
            properties,
            actions,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            Branch::Live { source_id, .. } => source_id,
            Branch::Dead { .. } => DEAD_SOURCE_ID,
        }
    }

    pub fn head(&self) -> &Head {
        match self {
            Branch::Live { head, .. } | Branch::Dead { head, .. } => head,
        }
    }

    pub fn name(&self) -> &str {
        &self.head().name
    }

    pub fn scm(&self) -> ScmRef {
        match self {
            Branch::Live { scm, .. } => scm.clone(),
            Branch::Dead { .. } => ScmRef::none(),
        }
    }

    pub fn properties(&self) -> &[BranchProperty] {
        match self {
            Branch::Live { properties, .. } | Branch::Dead { properties, .. } => properties,
        }
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            Branch::Live { actions, .. } | Branch::Dead { actions, .. } => actions,
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Branch::Dead { .. })
    }

    /// Field-by-field comparison, unlike `==` which only looks at identity.
    pub fn content_eq(&self, other: &Branch) -> bool {
        self == other
            && self.head().kind == other.head().kind
            && self.scm() == other.scm()
            && self.properties() == other.properties()
            && self.actions() == other.actions()
    }
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.source_id() == other.source_id() && self.name() == other.name()
    }
}

impl Eq for Branch {}

impl std::hash::Hash for Branch {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source_id().hash(state);
        self.name().hash(state);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    fn main_from(source: &str, reference: &str) -> Branch {
        Branch::live(
            source,
            Head::branch("main"),
            ScmRef::new("git", "origin", reference),
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn identity_ignores_content() {
        let a = main_from("origin", "refs/heads/main");
        let b = Branch::live(
            "origin",
            Head::branch("main"),
            ScmRef::new("git", "mirror", "refs/heads/main"),
            Vec::new(),
            vec![Action::new("display_name", "Main")],
        );
        assert_eq!(a, b);
        assert!(!a.content_eq(&b));
        assert!(a.content_eq(&a.clone()));
    }

    #[test]
    fn different_sources_are_different_branches() {
        assert_ne!(main_from("a", "x"), main_from("b", "x"));
    }

    #[test]
    fn dead_branch_uses_sentinel() {
        let dead = Branch::Dead {
            head: Head::branch("main"),
            properties: Vec::new(),
            actions: Vec::new(),
        };
        assert_eq!(dead.source_id(), DEAD_SOURCE_ID);
        assert!(dead.scm().is_none());
        assert!(dead.is_dead());
        assert_ne!(dead, main_from("origin", "x"));
    }

    #[test]
    fn yaml_roundtrip_keeps_state_tag() {
        let branch = main_from("origin", "refs/heads/main");
        let yaml = serde_yaml::to_string(&branch).unwrap();
        assert!(yaml.contains("state: live"));
        let parsed: Branch = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.content_eq(&branch));
    }
}
