//! Build decision gate.
//!
//! Every source carries an ordered chain of build strategies. The gate walks
//! the chain and the first strategy with an opinion decides. An empty chain
//! builds everything except tags.

use crate::criteria::wildcards_to_regex;
use crate::types::{Head, HeadKind, Revision};
use chrono::{DateTime, Duration, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// BuildContext
// ---------------------------------------------------------------------------

pub struct BuildContext<'a> {
    pub source_id: &'a str,
    pub head: &'a Head,
    pub revision: &'a Revision,
    pub last_built: Option<&'a Revision>,
    pub last_seen: Option<&'a Revision>,
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// BuildStrategy
// ---------------------------------------------------------------------------

pub trait BuildStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `Some(true)` to build, `Some(false)` to skip, `None` to defer to the
    /// next strategy in the chain.
    fn decide(&self, ctx: &BuildContext<'_>) -> Option<bool>;
}

/// Evaluate a strategy chain.
pub fn is_automatic_build(strategies: &[Arc<dyn BuildStrategy>], ctx: &BuildContext<'_>) -> bool {
    if strategies.is_empty() {
        return !ctx.head.is_tag();
    }
    for strategy in strategies {
        if let Some(decision) = strategy.decide(ctx) {
            tracing::debug!(
                strategy = strategy.name(),
                head = %ctx.head,
                decision,
                "build strategy decided"
            );
            return decision;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// NamePattern
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamePattern {
    Wildcards {
        includes: String,
        #[serde(default)]
        excludes: String,
    },
    Regex {
        regex: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Exact {
        name: String,
        #[serde(default)]
        case_sensitive: bool,
    },
}

impl NamePattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Wildcards { includes, excludes } => {
                match (wildcards_to_regex(includes), wildcards_to_regex(excludes)) {
                    (Ok(inc), Ok(exc)) => inc.is_match(name) && !exc.is_match(name),
                    _ => false,
                }
            }
            NamePattern::Regex {
                regex,
                case_sensitive,
            } => match RegexBuilder::new(&format!("^(?:{regex})$"))
                .case_insensitive(!case_sensitive)
                .build()
            {
                Ok(re) => re.is_match(name),
                Err(e) => {
                    tracing::warn!("ignoring invalid branch name regex '{regex}': {e}");
                    false
                }
            },
            NamePattern::Exact {
                name: expected,
                case_sensitive,
            } => {
                if *case_sensitive {
                    expected == name
                } else {
                    expected.eq_ignore_ascii_case(name)
                }
            }
        }
    }

    /// Errors a configuration check should surface.
    pub fn validate(&self) -> Option<String> {
        match self {
            NamePattern::Regex { regex, .. } => RegexBuilder::new(regex)
                .build()
                .err()
                .map(|e| format!("invalid regex '{regex}': {e}")),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BuiltinStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuiltinStrategy {
    /// Plain branches.
    Branches,
    ChangeRequests,
    /// Tags whose age falls inside the window. Tags without a timestamp
    /// only build when no window is set.
    Tags {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_least_days: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_most_days: Option<i64>,
    },
    /// Plain branches whose name matches any pattern.
    NamedBranches { patterns: Vec<NamePattern> },
    /// Never build the first revision ever seen for a head.
    SkipInitialBuild,
    Always,
    Never,
}

impl BuildStrategy for BuiltinStrategy {
    fn name(&self) -> &str {
        match self {
            BuiltinStrategy::Branches => "branches",
            BuiltinStrategy::ChangeRequests => "change_requests",
            BuiltinStrategy::Tags { .. } => "tags",
            BuiltinStrategy::NamedBranches { .. } => "named_branches",
            BuiltinStrategy::SkipInitialBuild => "skip_initial_build",
            BuiltinStrategy::Always => "always",
            BuiltinStrategy::Never => "never",
        }
    }

    fn decide(&self, ctx: &BuildContext<'_>) -> Option<bool> {
        match self {
            BuiltinStrategy::Branches => {
                matches!(ctx.head.kind, HeadKind::Branch).then_some(true)
            }
            BuiltinStrategy::ChangeRequests => ctx.head.is_change_request().then_some(true),
            BuiltinStrategy::Tags {
                at_least_days,
                at_most_days,
            } => {
                let HeadKind::Tag { timestamp } = &ctx.head.kind else {
                    return None;
                };
                let Some(ts) = timestamp else {
                    return Some(at_least_days.is_none() && at_most_days.is_none());
                };
                let age = ctx.now.signed_duration_since(*ts);
                if at_least_days.is_some_and(|d| younger_than(age, d)) {
                    return Some(false);
                }
                if at_most_days.is_some_and(|d| older_than(age, d)) {
                    return Some(false);
                }
                Some(true)
            }
            BuiltinStrategy::NamedBranches { patterns } => {
                let is_branch = matches!(ctx.head.kind, HeadKind::Branch);
                (is_branch && patterns.iter().any(|p| p.matches(&ctx.head.name))).then_some(true)
            }
            BuiltinStrategy::SkipInitialBuild => {
                (ctx.last_built.is_none() && ctx.last_seen.is_none()).then_some(false)
            }
            BuiltinStrategy::Always => Some(true),
            BuiltinStrategy::Never => Some(false),
        }
    }
}

/// Windows too wide for a `Duration` behave as if they were infinite.
fn younger_than(age: Duration, days: i64) -> bool {
    match Duration::try_days(days) {
        Some(window) => age < window,
        None => days > 0,
    }
}

fn older_than(age: Duration, days: i64) -> bool {
    match Duration::try_days(days) {
        Some(window) => age > window,
        None => days < 0,
    }
}

/// Problems with a tag window that make it useless, if any.
pub fn check_tag_window(at_least_days: Option<i64>, at_most_days: Option<i64>) -> Option<String> {
    for (field, days) in [("at_least_days", at_least_days), ("at_most_days", at_most_days)] {
        match days {
            Some(d) if d < 0 => return Some(format!("{field} must not be negative (got {d})")),
            Some(d) if Duration::try_days(d).is_none() => {
                return Some(format!("{field} is out of range (got {d})"))
            }
            _ => {}
        }
    }
    match (at_least_days, at_most_days) {
        (Some(least), Some(most)) if least > most => Some(format!(
            "at_least_days ({least}) is greater than at_most_days ({most}): no tag can build"
        )),
        _ => None,
    }
}

pub fn into_chain(strategies: Vec<BuiltinStrategy>) -> Vec<Arc<dyn BuildStrategy>> {
    strategies
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn BuildStrategy>)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
