//! Deciding when dead children are actually deleted.
//!
//! Reconciliation only ever marks children dead. Removal is a separate step
//! driven by an [`OrphanPolicy`].

use crate::project::ChildProject;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub trait OrphanPolicy: Send + Sync {
    /// Encoded names of the dead children that should be removed now.
    fn select(&self, dead: &[&ChildProject], now: DateTime<Utc>) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultOrphanPolicy {
    #[serde(default = "default_prune_dead")]
    pub prune_dead: bool,
    /// Keep anything dead for fewer than this many days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_keep: Option<u32>,
    /// Always keep this many of the most recently killed children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_to_keep: Option<u32>,
}

fn default_prune_dead() -> bool {
    true
}

impl Default for DefaultOrphanPolicy {
    fn default() -> Self {
        Self {
            prune_dead: default_prune_dead(),
            days_to_keep: None,
            num_to_keep: None,
        }
    }
}

impl OrphanPolicy for DefaultOrphanPolicy {
    fn select(&self, dead: &[&ChildProject], now: DateTime<Utc>) -> Vec<String> {
        if !self.prune_dead {
            return Vec::new();
        }
        let mut candidates: Vec<&ChildProject> = dead.iter().copied().filter(|c| c.is_dead()).collect();
        // Newest first; children without a timestamp count as oldest.
        candidates.sort_by(|a, b| b.dead_since.cmp(&a.dead_since).then_with(|| a.name.cmp(&b.name)));

        let keep = self.num_to_keep.unwrap_or(0) as usize;
        candidates
            .into_iter()
            .skip(keep)
            .filter(|c| match (self.days_to_keep, c.dead_since) {
                (Some(days), Some(since)) => now.signed_duration_since(since) >= Duration::days(i64::from(days)),
                _ => true,
            })
            .map(|c| c.name.clone())
            .collect()
    }
}
