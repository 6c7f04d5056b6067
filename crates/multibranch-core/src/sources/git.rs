//! A source that asks a git remote for its refs with `git ls-remote`.

use crate::criteria::HeadCriteria;
use crate::error::SourceError;
use crate::progress::ProgressSink;
use crate::source::{offer, HeadObserver, ScmSource, SourceResult};
use crate::types::{Head, HeadKind, Revision, ScmRef};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";
const PEELED_SUFFIX: &str = "^{}";

#[derive(Debug, Clone)]
pub struct GitSource {
    id: String,
    remote: String,
}

impl GitSource {
    pub fn new(id: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote: remote.into(),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn ls_remote(&self) -> SourceResult<String> {
        let git = git_bin()?;
        let output = Command::new(&git)
            .args(["ls-remote", "--heads", "--tags", self.remote.as_str()])
            .output()?;
        if !output.status.success() {
            return Err(SourceError::Command {
                command: format!("git ls-remote {}", self.remote),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn git_bin() -> SourceResult<PathBuf> {
    which::which("git").map_err(|_| SourceError::GitNotFound)
}

/// Parse `git ls-remote` output into heads, branches first, each group in
/// name order. Annotated tags report the commit they point at.
pub fn parse_ls_remote(source_id: &str, output: &str) -> SourceResult<Vec<(Head, Revision)>> {
    let mut branches = BTreeMap::new();
    let mut tags = BTreeMap::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((hash, reference)) = line.split_once(char::is_whitespace) else {
            return Err(SourceError::Malformed {
                source_id: source_id.to_string(),
                detail: format!("unexpected line '{line}'"),
            });
        };
        let reference = reference.trim();
        if let Some(name) = reference.strip_prefix(HEADS_PREFIX) {
            branches.insert(name.to_string(), hash.to_string());
        } else if let Some(tag) = reference.strip_prefix(TAGS_PREFIX) {
            match tag.strip_suffix(PEELED_SUFFIX) {
                Some(name) => {
                    tags.insert(name.to_string(), hash.to_string());
                }
                None => {
                    tags.entry(tag.to_string())
                        .or_insert_with(|| hash.to_string());
                }
            }
        }
    }

    let mut heads: Vec<(Head, Revision)> = branches
        .into_iter()
        .map(|(name, hash)| (Head::branch(name), Revision::new(hash)))
        .collect();
    heads.extend(tags.into_iter().map(|(name, hash)| {
        (
            Head {
                name,
                kind: HeadKind::Tag { timestamp: None },
            },
            Revision::new(hash),
        )
    }));
    Ok(heads)
}

impl ScmSource for GitSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(
        &self,
        criteria: Option<&dyn HeadCriteria>,
        observer: &mut dyn HeadObserver,
        progress: &dyn ProgressSink,
    ) -> SourceResult<()> {
        progress.line(&format!("Listing remote references of {}", self.remote));
        let output = self.ls_remote()?;
        for (head, revision) in parse_ls_remote(&self.id, &output)? {
            if !observer.is_observing() {
                break;
            }
            offer(criteria, observer, head, revision);
        }
        Ok(())
    }

    fn build(&self, head: &Head, _revision: &Revision) -> ScmRef {
        let prefix = if head.is_tag() { TAGS_PREFIX } else { HEADS_PREFIX };
        ScmRef::new("git", &self.remote, format!("{prefix}{}", head.name))
    }
}
