//! Source priority arbitration.
//!
//! When two sources report the same name, the one listed first owns it. An
//! owner that is no longer configured has infinite rank and loses to anyone.

use crate::source::BranchSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arbitration {
    OwnerWins,
    ChallengerWins,
}

/// 1-based rank of `id` in `ids`, `None` when absent.
pub fn rank<'a, I>(ids: I, id: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter().position(|candidate| candidate == id).map(|i| i + 1)
}

/// Decide between the current owner of a name and a challenger, given the
/// ordered ids of the configured contenders.
pub fn arbitrate_ids<'a, I>(ids: I, owner: &str, challenger: &str) -> Arbitration
where
    I: IntoIterator<Item = &'a str>,
{
    let mut owner_rank = None;
    let mut challenger_rank = None;
    for (i, id) in ids.into_iter().enumerate() {
        if owner_rank.is_none() && id == owner {
            owner_rank = Some(i + 1);
        }
        if challenger_rank.is_none() && id == challenger {
            challenger_rank = Some(i + 1);
        }
    }
    match (owner_rank, challenger_rank) {
        (None, _) => Arbitration::ChallengerWins,
        (Some(_), None) => Arbitration::OwnerWins,
        (Some(o), Some(c)) if c < o => Arbitration::ChallengerWins,
        _ => Arbitration::OwnerWins,
    }
}

/// [`arbitrate_ids`] over a container's source list.
pub fn arbitrate(sources: &[BranchSource], owner: &str, challenger: &str) -> Arbitration {
    arbitrate_ids(sources.iter().map(|s| s.id()), owner, challenger)
}
