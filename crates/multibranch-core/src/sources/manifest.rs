//! A source backed by a YAML file listing heads.
//!
//! The file is re-read on every fetch, so editing it between passes is how
//! heads appear, move and disappear.
//!
//! ```yaml
//! actions:
//!   - name: description
//!     value: Mirror of the upstream repository
//! heads:
//!   - name: main
//!     revision: 4f2a9c1
//!   - name: v1.0
//!     revision: 88d01be
//!     kind:
//!       type: tag
//! ```

use crate::criteria::HeadCriteria;
use crate::error::SourceError;
use crate::event::{HeadEvent, SourceEvent};
use crate::progress::ProgressSink;
use crate::source::{offer, HeadObserver, ScmSource, SourceResult};
use crate::types::{Action, Head, HeadKind, Revision, ScmRef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadManifest {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub heads: Vec<HeadEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadEntry {
    pub name: String,
    pub revision: String,
    #[serde(default = "default_deterministic")]
    pub deterministic: bool,
    #[serde(default)]
    pub kind: HeadKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

fn default_deterministic() -> bool {
    true
}

impl HeadEntry {
    pub fn branch(name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: revision.into(),
            deterministic: true,
            kind: HeadKind::Branch,
            actions: Vec::new(),
        }
    }

    fn head(&self) -> Head {
        Head {
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }

    fn revision(&self) -> Revision {
        Revision {
            hash: self.revision.clone(),
            deterministic: self.deterministic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestSource {
    id: String,
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unparsable file is a transient failure: the branches
    /// this source owns are kept as they are.
    fn read(&self) -> SourceResult<HeadManifest> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| SourceError::Unavailable {
            source_id: self.id.clone(),
            reason: format!("{}: {e}", self.path.display()),
        })?;
        serde_yaml::from_str(&data).map_err(|e| SourceError::Malformed {
            source_id: self.id.clone(),
            detail: e.to_string(),
        })
    }
}

impl ScmSource for ManifestSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(
        &self,
        criteria: Option<&dyn HeadCriteria>,
        observer: &mut dyn HeadObserver,
        progress: &dyn ProgressSink,
    ) -> SourceResult<()> {
        let manifest = self.read()?;
        progress.line(&format!(
            "Found {} heads in {}",
            manifest.heads.len(),
            self.path.display()
        ));
        for entry in &manifest.heads {
            if !observer.is_observing() {
                break;
            }
            offer(criteria, observer, entry.head(), entry.revision());
        }
        Ok(())
    }

    fn build(&self, head: &Head, _revision: &Revision) -> ScmRef {
        ScmRef::new("manifest", self.path.display().to_string(), &head.name)
    }

    fn fetch_actions(
        &self,
        head: &Head,
        _revision: &Revision,
        _event: Option<&HeadEvent>,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<Vec<Action>> {
        let manifest = self.read()?;
        Ok(manifest
            .heads
            .into_iter()
            .find(|e| e.name == head.name)
            .map(|e| e.actions)
            .unwrap_or_default())
    }

    fn fetch_source_actions(
        &self,
        _event: Option<&SourceEvent>,
        _progress: &dyn ProgressSink,
    ) -> SourceResult<Vec<Action>> {
        Ok(self.read()?.actions)
    }
}
