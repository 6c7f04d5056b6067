use crate::criteria::wildcards_to_regex;
use crate::error::{ReconcileError, Result};
use crate::types::{BuildCause, Head};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SuppressionStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionStrategy {
    /// Suppress builds triggered by full scans.
    Indexing,
    /// Suppress builds triggered by source events.
    Events,
    /// Suppress nothing.
    None,
}

impl SuppressionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SuppressionStrategy::Indexing => "indexing",
            SuppressionStrategy::Events => "events",
            SuppressionStrategy::None => "none",
        }
    }

    /// Whether a build with this cause must not start.
    ///
    /// Causes this strategy has never heard of are an error: guessing either
    /// way would silently force or drop builds.
    pub fn suppresses(self, cause: &BuildCause) -> Result<bool> {
        match cause {
            BuildCause::Manual { .. } => Ok(false),
            BuildCause::BranchIndexing => Ok(self == SuppressionStrategy::Indexing),
            BuildCause::BranchEvent { .. } => Ok(self == SuppressionStrategy::Events),
            BuildCause::Other { kind } => Err(ReconcileError::UnknownCause {
                cause: kind.clone(),
                strategy: self.as_str().to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// BranchProperty
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BranchProperty {
    SuppressAutomaticTriggering { strategy: SuppressionStrategy },
    BuildRetention {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days_to_keep: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_to_keep: Option<u32>,
    },
}

/// Whether any property on the branch blocks a build with this cause.
pub fn is_suppressed(properties: &[BranchProperty], cause: &BuildCause) -> Result<bool> {
    for property in properties {
        if let BranchProperty::SuppressAutomaticTriggering { strategy } = property {
            if strategy.suppresses(cause)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// PropertyStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedException {
    /// Space-separated wildcards matched against the head name.
    pub names: String,
    #[serde(default)]
    pub properties: Vec<BranchProperty>,
}

/// Decides which properties a head gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyStrategy {
    Default {
        #[serde(default)]
        properties: Vec<BranchProperty>,
    },
    /// Per-name overrides; the first matching exception wins.
    NamedExceptions {
        #[serde(default)]
        defaults: Vec<BranchProperty>,
        #[serde(default)]
        exceptions: Vec<NamedException>,
    },
}

impl Default for PropertyStrategy {
    fn default() -> Self {
        PropertyStrategy::Default {
            properties: Vec::new(),
        }
    }
}

impl PropertyStrategy {
    pub fn properties_for(&self, head: &Head) -> Result<Vec<BranchProperty>> {
        match self {
            PropertyStrategy::Default { properties } => Ok(properties.clone()),
            PropertyStrategy::NamedExceptions {
                defaults,
                exceptions,
            } => {
                for exception in exceptions {
                    if wildcards_to_regex(&exception.names)?.is_match(&head.name) {
                        return Ok(exception.properties.clone());
                    }
                }
                Ok(defaults.clone())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event_cause() -> BuildCause {
        BuildCause::BranchEvent {
            origin: "hook".to_string(),
            description: "push".to_string(),
        }
    }

    #[test]
    fn suppression_by_cause() {
        let s = SuppressionStrategy::Indexing;
        assert!(s.suppresses(&BuildCause::BranchIndexing).unwrap());
        assert!(!s.suppresses(&event_cause()).unwrap());

        let s = SuppressionStrategy::Events;
        assert!(!s.suppresses(&BuildCause::BranchIndexing).unwrap());
        assert!(s.suppresses(&event_cause()).unwrap());

        let s = SuppressionStrategy::None;
        assert!(!s.suppresses(&BuildCause::BranchIndexing).unwrap());
        assert!(!s
            .suppresses(&BuildCause::Manual {
                user: "me".to_string()
            })
            .unwrap());
    }

    #[test]
    fn unknown_cause_is_an_error() {
        let err = SuppressionStrategy::Events
            .suppresses(&BuildCause::Other {
                kind: "timer".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownCause { .. }));
    }

    #[test]
    fn unknown_cause_without_suppression_property_is_fine() {
        let props = vec![BranchProperty::BuildRetention {
            days_to_keep: Some(3),
            num_to_keep: None,
        }];
        let other = BuildCause::Other {
            kind: "timer".to_string(),
        };
        assert!(!is_suppressed(&props, &other).unwrap());
    }

    #[test]
    fn named_exceptions_first_match_wins() {
        let strategy = PropertyStrategy::NamedExceptions {
            defaults: vec![BranchProperty::SuppressAutomaticTriggering {
                strategy: SuppressionStrategy::Indexing,
            }],
            exceptions: vec![
                NamedException {
                    names: "main release/*".to_string(),
                    properties: Vec::new(),
                },
                NamedException {
                    names: "*".to_string(),
                    properties: vec![BranchProperty::BuildRetention {
                        days_to_keep: None,
                        num_to_keep: Some(5),
                    }],
                },
            ],
        };
        assert!(strategy
            .properties_for(&Head::branch("main"))
            .unwrap()
            .is_empty());
        assert_eq!(
            strategy.properties_for(&Head::branch("feature/x")).unwrap(),
            vec![BranchProperty::BuildRetention {
                days_to_keep: None,
                num_to_keep: Some(5),
            }]
        );
    }

    #[test]
    fn property_strategy_yaml() {
        let yaml = "type: default\nproperties:\n  - type: suppress_automatic_triggering\n    strategy: events\n";
        let strategy: PropertyStrategy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            strategy.properties_for(&Head::branch("x")).unwrap(),
            vec![BranchProperty::SuppressAutomaticTriggering {
                strategy: SuppressionStrategy::Events
            }]
        );
    }
}
