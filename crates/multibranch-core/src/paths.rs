use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const STATE_DIR: &str = ".multibranch";
pub const BRANCHES_DIR: &str = ".multibranch/branches";

pub const CONFIG_FILE: &str = ".multibranch/config.yaml";
pub const SOURCES_FILE: &str = ".multibranch/sources.yaml";
pub const QUEUE_FILE: &str = ".multibranch/queue.jsonl";

pub const MANIFEST_FILE: &str = "manifest.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn sources_path(root: &Path) -> PathBuf {
    root.join(SOURCES_FILE)
}

pub fn queue_path(root: &Path) -> PathBuf {
    root.join(QUEUE_FILE)
}

pub fn branches_dir(root: &Path) -> PathBuf {
    root.join(BRANCHES_DIR)
}

/// Directory of one child, keyed by its encoded name.
pub fn child_dir(root: &Path, encoded: &str) -> PathBuf {
    branches_dir(root).join(encoded)
}

pub fn child_manifest(root: &Path, encoded: &str) -> PathBuf {
    child_dir(root, encoded).join(MANIFEST_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
