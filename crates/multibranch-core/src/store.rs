//! Where child projects live between passes.

use crate::error::{ReconcileError, Result};
use crate::io;
use crate::paths;
use crate::project::{Child, ChildProject};
use crate::types::Action;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Auxiliary metadata per source id.
pub type SourceActions = BTreeMap<String, Vec<Action>>;

pub const BRANCH_KIND: &str = "branch";

pub trait ChildStore: Send + Sync {
    fn load_children(&self) -> Result<Vec<Child>>;

    fn save(&self, child: &ChildProject) -> Result<()>;

    fn remove(&self, name: &str) -> Result<()>;

    fn load_source_actions(&self) -> Result<SourceActions>;

    fn save_source_actions(&self, actions: &SourceActions) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    children: Mutex<BTreeMap<String, Child>>,
    source_actions: Mutex<SourceActions>,
    failing: Mutex<BTreeSet<String>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place something under `name` that is not a branch project.
    pub fn insert_unrecognized(&self, name: &str, kind: &str) {
        self.children.lock().insert(
            name.to_string(),
            Child::Unrecognized {
                name: name.to_string(),
                kind: kind.to_string(),
            },
        );
    }

    /// Make every save of `name` fail until cleared.
    pub fn fail_saves_for(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn get(&self, name: &str) -> Option<Child> {
        self.children.lock().get(name).cloned()
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl ChildStore for MemoryStore {
    fn load_children(&self) -> Result<Vec<Child>> {
        Ok(self.children.lock().values().cloned().collect())
    }

    fn save(&self, child: &ChildProject) -> Result<()> {
        if self.failing.lock().contains(&child.name) {
            return Err(ReconcileError::Persistence {
                name: child.name.clone(),
                reason: "injected failure".to_string(),
            });
        }
        self.children
            .lock()
            .insert(child.name.clone(), Child::Project(child.clone()));
        *self.saves.lock() += 1;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.children.lock().remove(name);
        Ok(())
    }

    fn load_source_actions(&self) -> Result<SourceActions> {
        Ok(self.source_actions.lock().clone())
    }

    fn save_source_actions(&self, actions: &SourceActions) -> Result<()> {
        *self.source_actions.lock() = actions.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FsStore
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project: Option<ChildProject>,
}

/// One `manifest.yaml` per child under `.multibranch/branches/<encoded>/`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_one(&self, name: &str) -> Child {
        let unrecognized = |kind: &str| Child::Unrecognized {
            name: name.to_string(),
            kind: kind.to_string(),
        };
        let path = paths::child_manifest(&self.root, name);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("no readable manifest at {}: {e}", path.display());
                return unrecognized("unknown");
            }
        };
        let manifest: Manifest = match serde_yaml::from_str(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("unreadable manifest at {}: {e}", path.display());
                return unrecognized("unreadable");
            }
        };
        match (manifest.kind.as_str(), manifest.project) {
            (BRANCH_KIND, Some(mut project)) => {
                if project.name != name {
                    tracing::warn!(
                        "manifest at {} names '{}', using directory name",
                        path.display(),
                        project.name
                    );
                    project.name = name.to_string();
                }
                Child::Project(project)
            }
            (kind, _) => unrecognized(kind),
        }
    }
}

impl ChildStore for FsStore {
    fn load_children(&self) -> Result<Vec<Child>> {
        let dir = paths::branches_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names.iter().map(|n| self.load_one(n)).collect())
    }

    fn save(&self, child: &ChildProject) -> Result<()> {
        let manifest = Manifest {
            kind: BRANCH_KIND.to_string(),
            project: Some(child.clone()),
        };
        let data = serde_yaml::to_string(&manifest)?;
        io::atomic_write(&paths::child_manifest(&self.root, &child.name), data.as_bytes())
    }

    fn remove(&self, name: &str) -> Result<()> {
        io::remove_dir_if_exists(&paths::child_dir(&self.root, name))?;
        Ok(())
    }

    fn load_source_actions(&self) -> Result<SourceActions> {
        let path = paths::sources_path(&self.root);
        if !path.exists() {
            return Ok(SourceActions::new());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    fn save_source_actions(&self, actions: &SourceActions) -> Result<()> {
        let data = serde_yaml::to_string(actions)?;
        io::atomic_write(&paths::sources_path(&self.root), data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Branch;
    use crate::types::{Head, Revision, ScmRef};
    use tempfile::TempDir;

    fn child(name: &str) -> ChildProject {
        let mut child = ChildProject::new(
            name,
            Branch::live(
                "origin",
                Head::branch("feature/x"),
                ScmRef::new("git", "r", "refs/heads/feature/x"),
                Vec::new(),
                Vec::new(),
            ),
        );
        child.last_seen = Some(Revision::new("abc"));
        child
    }

    #[test]
    fn fs_store_saves_and_loads() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        store.save(&child("feature-x.abc")).unwrap();
        let children = store.load_children().unwrap();
        assert_eq!(children.len(), 1);
        let project = children[0].as_project().unwrap();
        assert_eq!(project.branch_name(), "feature/x");
        assert_eq!(project.last_seen, Some(Revision::new("abc")));
    }

    #[test]
    fn fs_store_foreign_manifest_is_unrecognized() {
        let dir = TempDir::new().unwrap();
        let path = paths::child_manifest(dir.path(), "notes");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "kind: folder\n").unwrap();
        std::fs::create_dir_all(paths::child_dir(dir.path(), "empty")).unwrap();

        let store = FsStore::new(dir.path());
        let children = store.load_children().unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.as_project().is_none()));
        assert!(matches!(&children[1], Child::Unrecognized { kind, .. } if kind == "folder"));
    }

    #[test]
    fn fs_store_remove_and_source_actions() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        store.save(&child("a")).unwrap();
        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.load_children().unwrap().is_empty());

        assert!(store.load_source_actions().unwrap().is_empty());
        let mut actions = SourceActions::new();
        actions.insert("origin".to_string(), vec![Action::new("description", "repo")]);
        store.save_source_actions(&actions).unwrap();
        assert_eq!(store.load_source_actions().unwrap(), actions);
    }

    #[test]
    fn memory_store_injected_failure() {
        let store = MemoryStore::new();
        store.fail_saves_for("a");
        assert!(matches!(
            store.save(&child("a")),
            Err(ReconcileError::Persistence { .. })
        ));
        store.save(&child("b")).unwrap();
        assert_eq!(store.save_count(), 1);
        store.clear_failures();
        store.save(&child("a")).unwrap();
        assert_eq!(store.load_children().unwrap().len(), 2);
    }
}
