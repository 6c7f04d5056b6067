//! A build queue that lives on disk as JSON lines.

use multibranch_core::project::ChildProject;
use multibranch_core::scheduler::{BuildScheduler, QueuedBuild};
use multibranch_core::types::{Action, BuildCause};
use multibranch_core::{io, paths};
use std::path::{Path, PathBuf};

/// Appends one `QueuedBuild` per line to `.multibranch/queue.jsonl`. Whatever
/// executes builds tails that file.
#[derive(Debug, Clone)]
pub struct FileQueueScheduler {
    path: PathBuf,
}

impl FileQueueScheduler {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::queue_path(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BuildScheduler for FileQueueScheduler {
    fn schedule(&self, child: &ChildProject, causes: &[BuildCause], actions: &[Action]) -> bool {
        let build = QueuedBuild::new(child, causes, actions);
        let line = match serde_json::to_string(&build) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(child = %child.name, "could not encode build request: {e}");
                return false;
            }
        };
        match io::append_line(&self.path, &line) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(child = %child.name, "could not queue build: {e}");
                false
            }
        }
    }
}

/// Every request queued so far, oldest first. Unparseable lines are skipped.
pub fn read_queue(root: &Path) -> anyhow::Result<Vec<QueuedBuild>> {
    let path = paths::queue_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(&path)?;
    Ok(data
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(build) => Some(build),
            Err(e) => {
                tracing::warn!("skipping bad queue line: {e}");
                None
            }
        })
        .collect())
}
