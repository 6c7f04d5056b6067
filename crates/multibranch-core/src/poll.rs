//! Change detection for revisions that cannot be compared directly.

use crate::progress::ProgressSink;
use crate::source::SourceResult;
use crate::types::{Head, Revision};

pub trait ChangePoller: Send + Sync {
    /// Whether `head` has moved on since `last_seen`. Called only when the
    /// incoming revision is non-deterministic; may block on the network.
    fn has_changed(
        &self,
        head: &Head,
        last_seen: Option<&Revision>,
        current: &Revision,
        progress: &dyn ProgressSink,
    ) -> SourceResult<bool>;
}

/// Compares hashes and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashPoller;

impl ChangePoller for HashPoller {
    fn has_changed(
        &self,
        _head: &Head,
        last_seen: Option<&Revision>,
        current: &Revision,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<bool> {
        Ok(last_seen.map_or(true, |seen| seen.hash != current.hash))
    }
}
