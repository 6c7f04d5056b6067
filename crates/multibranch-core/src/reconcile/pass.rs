use super::{check_unique_ids, Cancellation, PassEnv};
use crate::branch::Branch;
use crate::error::Result;
use crate::event::{EventKind, HeadEvent};
use crate::lifecycle::{classify, kill, needs_build_evaluation, Transition};
use crate::mangle::mangle;
use crate::priority::{arbitrate, Arbitration};
use crate::project::ChildProject;
use crate::property::is_suppressed;
use crate::report::{BuildOutcome, Change, ChildOutcome, FailedSource};
use crate::source::{BranchSource, HeadObserver};
use crate::store::SourceActions;
use crate::strategy::{is_automatic_build, BuildContext};
use crate::types::{BuildCause, Head, Revision};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
pub(crate) enum Scope<'a> {
    Full,
    Event(&'a HeadEvent),
}

impl<'a> Scope<'a> {
    fn event(self) -> Option<&'a HeadEvent> {
        match self {
            Scope::Full => None,
            Scope::Event(e) => Some(e),
        }
    }

    fn covers_source(self, id: &str) -> bool {
        match self {
            Scope::Full => true,
            Scope::Event(e) => e.is_match(id),
        }
    }

    fn covers_name(self, raw: &str) -> bool {
        match self {
            Scope::Full => true,
            Scope::Event(e) => e.heads.iter().any(|h| h.head.name == raw),
        }
    }

    /// Created events only ever add children.
    fn creates_only(self) -> bool {
        matches!(self, Scope::Event(e) if e.kind == EventKind::Created)
    }

    fn cause(self) -> BuildCause {
        match self {
            Scope::Full => BuildCause::BranchIndexing,
            Scope::Event(e) => e.cause(),
        }
    }
}

// ---------------------------------------------------------------------------
// Staged output
// ---------------------------------------------------------------------------

/// A decision waiting for commit.
#[derive(Debug, Clone)]
pub struct Staged {
    pub project: ChildProject,
    pub change: Change,
    pub build: BuildOutcome,
    /// Revision to record as built if the scheduler accepts.
    pub schedule: Option<Revision>,
    pub cause: BuildCause,
}

impl Staged {
    pub fn outcome(&self) -> ChildOutcome {
        ChildOutcome {
            name: self.project.name.clone(),
            branch: self.project.branch_name().to_string(),
            source_id: Some(self.project.branch.source_id().to_string()),
            change: self.change.clone(),
            build: self.build.clone(),
            persisted: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct PassOutput {
    /// In encoded-name order.
    pub staged: Vec<Staged>,
    /// Observations that produced no staged change.
    pub skipped: Vec<ChildOutcome>,
    pub failed_sources: Vec<FailedSource>,
    /// Fresh source-level actions, keyed by source id.
    pub source_actions: SourceActions,
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

struct Collector<'a> {
    cancel: &'a Cancellation,
    heads: Vec<(Head, Revision)>,
}

impl HeadObserver for Collector<'_> {
    fn observe(&mut self, head: Head, revision: Revision) {
        self.heads.push((head, revision));
    }

    fn is_observing(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

struct Claim {
    raw: String,
    source_id: String,
}

pub(crate) struct Pass<'a> {
    env: PassEnv<'a>,
    scope: Scope<'a>,
    cause: BuildCause,
    /// Encoded names decided this pass; also the single-assignment gate
    /// that stops two raw names creating the same child.
    claims: BTreeMap<String, Claim>,
    /// Encoded names that must not be marked dead this pass.
    observed: BTreeSet<String>,
    /// Sources whose fetch completed.
    fetched: BTreeSet<String>,
    failed: Vec<FailedSource>,
    staged: BTreeMap<String, Staged>,
    skipped: Vec<ChildOutcome>,
    source_actions: SourceActions,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(env: PassEnv<'a>, scope: Scope<'a>) -> Self {
        Self {
            env,
            scope,
            cause: scope.cause(),
            claims: BTreeMap::new(),
            observed: BTreeSet::new(),
            fetched: BTreeSet::new(),
            failed: Vec::new(),
            staged: BTreeMap::new(),
            skipped: Vec::new(),
            source_actions: SourceActions::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<PassOutput> {
        check_unique_ids(self.env.sources)?;
        let sources = self.env.sources;
        for source in sources {
            self.env.cancel.check()?;
            if !self.scope.covers_source(source.id()) {
                continue;
            }
            self.visit(source)?;
        }
        self.env.cancel.check()?;
        if !self.scope.creates_only() {
            self.mark_orphans();
        }
        Ok(PassOutput {
            staged: self.staged.into_values().collect(),
            skipped: self.skipped,
            failed_sources: self.failed,
            source_actions: self.source_actions,
        })
    }

    fn visit(&mut self, source: &BranchSource) -> Result<()> {
        let progress = self.env.progress;
        progress.line(&format!("Checking {}", source.id()));
        let mut collector = Collector {
            cancel: self.env.cancel,
            heads: Vec::new(),
        };
        let fetched = match self.scope {
            Scope::Full => source
                .source
                .fetch(self.env.criteria, &mut collector, progress),
            Scope::Event(event) => {
                source
                    .source
                    .fetch_event(self.env.criteria, &mut collector, event, progress)
            }
        };
        // A cancelled fetch may have stopped early; its heads are incomplete.
        self.env.cancel.check()?;

        if let Err(e) = fetched {
            tracing::warn!(source = source.id(), "fetch failed, keeping its branches: {e}");
            progress.line(&format!("Could not fetch from {}: {e}", source.id()));
            self.failed.push(FailedSource {
                id: source.id().to_string(),
                error: e.to_string(),
            });
            return Ok(());
        }
        self.fetched.insert(source.id().to_string());

        let count = collector.heads.len();
        for (head, revision) in collector.heads {
            self.env.cancel.check()?;
            self.observe(source, head, revision);
        }
        progress.line(&format!("Processed {count} heads from {}", source.id()));

        if matches!(self.scope, Scope::Full) {
            match source.source.fetch_source_actions(None, progress) {
                Ok(actions) => {
                    self.source_actions
                        .insert(source.id().to_string(), actions);
                }
                Err(e) => {
                    tracing::warn!(source = source.id(), "could not refresh source metadata: {e}")
                }
            }
        }
        Ok(())
    }

    fn observe(&mut self, source: &BranchSource, head: Head, revision: Revision) {
        let env = self.env;
        let progress = env.progress;
        let name = mangle(&head.name);

        if let Some(claim) = self.claims.get(&name) {
            if claim.raw != head.name {
                tracing::warn!(
                    "{} '{}' from {} encodes to '{}', already used by '{}'",
                    head.pronoun(),
                    head.name,
                    source.id(),
                    name,
                    claim.raw
                );
                let reason = format!("encoded name already used by '{}'", claim.raw);
                self.skip(&name, &head, source, reason);
            } else {
                tracing::debug!(
                    "{} {} from {} already decided by {}",
                    head.pronoun(),
                    head.name,
                    source.id(),
                    claim.source_id
                );
            }
            return;
        }

        let existing = match env.children.get(&name) {
            None => None,
            Some(child) => match child.as_project() {
                Some(project) if env.factory.is_project(child) => Some(project),
                _ => {
                    tracing::warn!("'{name}' exists but is not a branch project, leaving it alone");
                    progress.line(&format!("Skipping {name}: not a branch project"));
                    self.protect(&name, &head, source);
                    self.skip(&name, &head, source, "not a branch project".to_string());
                    return;
                }
            },
        };

        if self.scope.creates_only() && existing.is_some_and(|p| !p.is_dead()) {
            tracing::debug!("{} {} already exists, ignoring create event", head.pronoun(), head.name);
            self.protect(&name, &head, source);
            return;
        }

        if let Some(project) = existing {
            let owner = project.branch.source_id();
            if !project.is_dead()
                && owner != source.id()
                && arbitrate(env.sources, owner, source.id()) == Arbitration::OwnerWins
            {
                if self.fetched.contains(owner) {
                    // The owner was asked this pass and no longer reports it.
                    tracing::info!("{owner} dropped {}, {} may take over", head.name, source.id());
                } else {
                    progress.line(&format!(
                        "Ignoring {} {} from source {} as source {} owns the {} name",
                        head.pronoun().to_lowercase(),
                        head.name,
                        source.id(),
                        owner,
                        head.pronoun().to_lowercase()
                    ));
                    self.protect(&name, &head, source);
                    let reason = format!("owned by higher priority source {owner}");
                    self.skip(&name, &head, source, reason);
                    return;
                }
            }
        }

        let properties = match source.properties.properties_for(&head) {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!("cannot compute properties for {}: {e}", head.name);
                self.protect(&name, &head, source);
                self.skip(&name, &head, source, format!("properties unavailable: {e}"));
                return;
            }
        };
        let actions = match source
            .source
            .fetch_actions(&head, &revision, self.scope.event(), progress)
        {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!("cannot fetch metadata for {}: {e}", head.name);
                progress.line(&format!("Could not fetch metadata for {}: {e}", head.name));
                self.protect(&name, &head, source);
                self.skip(&name, &head, source, format!("metadata unavailable: {e}"));
                return;
            }
        };
        let branch = Branch::live(
            source.id(),
            head.clone(),
            source.source.build(&head, &revision),
            properties,
            actions,
        );

        let transition = classify(existing.map(|p| &p.branch), source.id());
        let changed = match (transition, existing) {
            (Transition::Refresh, Some(project)) => {
                match self.revision_changed(project, &head, &revision) {
                    Ok(changed) => changed,
                    Err(reason) => {
                        self.protect(&name, &head, source);
                        self.skip(&name, &head, source, reason);
                        return;
                    }
                }
            }
            _ => true,
        };

        let change = match (transition, existing) {
            (Transition::Create, _) => {
                progress.line(&format!("New {}: {} ({revision})", head.pronoun().to_lowercase(), head.name));
                Change::Created
            }
            (Transition::Reopen | Transition::Takeover, Some(project)) => {
                progress.line(&format!(
                    "{} {} reopened from {} ({revision})",
                    head.pronoun(),
                    head.name,
                    project.branch.source_id()
                ));
                Change::Reopened {
                    from: project.branch.source_id().to_string(),
                }
            }
            (_, Some(project)) if changed => {
                let previous = env
                    .factory
                    .last_seen_revision(project)
                    .map(|r| r.hash.as_str())
                    .unwrap_or("none");
                progress.line(&format!(
                    "Changes detected: {} ({previous} -> {revision})",
                    head.name
                ));
                Change::Updated
            }
            (_, Some(project)) if !project.branch.content_eq(&branch) => Change::Metadata,
            _ => {
                progress.line(&format!("No changes detected: {} (still at {revision})", head.name));
                Change::Unchanged
            }
        };

        let mut build = BuildOutcome::NotRequested;
        let mut schedule = None;
        if needs_build_evaluation(transition, changed) {
            let ctx = BuildContext {
                source_id: source.id(),
                head: &head,
                revision: &revision,
                last_built: existing.and_then(|p| env.factory.revision(p)),
                last_seen: existing.and_then(|p| env.factory.last_seen_revision(p)),
                now: env.now,
            };
            if is_automatic_build(&source.build_strategies, &ctx) {
                match is_suppressed(branch.properties(), &self.cause) {
                    Ok(true) => {
                        progress.line(&format!("Automatic build of {} suppressed", head.name));
                        build = BuildOutcome::Suppressed;
                    }
                    Ok(false) => schedule = Some(revision.clone()),
                    Err(e) => {
                        tracing::error!("build decision for {} failed: {e}", head.name);
                        build = BuildOutcome::Error {
                            message: e.to_string(),
                        };
                    }
                }
            }
        }

        let mut project = match existing {
            Some(project) => project.clone(),
            None => env.factory.new_instance(&name, branch.clone()),
        };
        env.factory.set_branch(&mut project, branch);
        env.factory.set_last_seen_revision(&mut project, revision);
        project.dead_since = None;
        env.factory.decorate(&mut project);

        self.protect(&name, &head, source);
        self.staged.insert(
            name,
            Staged {
                project,
                change,
                build,
                schedule,
                cause: self.cause.clone(),
            },
        );
    }

    /// Compare against the last seen revision. Errors come back as a skip
    /// reason so the branch is protected rather than touched.
    fn revision_changed(
        &self,
        project: &ChildProject,
        head: &Head,
        revision: &Revision,
    ) -> std::result::Result<bool, String> {
        let last_seen = self.env.factory.last_seen_revision(project);
        if revision.deterministic {
            return Ok(last_seen.map_or(true, |seen| seen.hash != revision.hash));
        }
        self.env
            .poller
            .has_changed(head, last_seen, revision, self.env.progress)
            .map_err(|e| {
                tracing::warn!("polling {} failed: {e}", head.name);
                format!("could not poll for changes: {e}")
            })
    }

    fn protect(&mut self, name: &str, head: &Head, source: &BranchSource) {
        self.observed.insert(name.to_string());
        self.claims.entry(name.to_string()).or_insert_with(|| Claim {
            raw: head.name.clone(),
            source_id: source.id().to_string(),
        });
    }

    fn skip(&mut self, name: &str, head: &Head, source: &BranchSource, reason: String) {
        self.skipped.push(ChildOutcome {
            name: name.to_string(),
            branch: head.name.clone(),
            source_id: Some(source.id().to_string()),
            change: Change::Skipped { reason },
            build: BuildOutcome::NotRequested,
            persisted: true,
        });
    }

    /// Whether a pass may conclude that `owner` no longer reports a name.
    fn may_kill_owned_by(&self, owner: &str) -> bool {
        match self.scope {
            Scope::Full => !self.failed.iter().any(|f| f.id == owner),
            Scope::Event(_) => self.fetched.contains(owner),
        }
    }

    fn mark_orphans(&mut self) {
        let env = self.env;
        let mut dead = Vec::new();
        for (name, child) in env.children {
            let Some(project) = child.as_project() else {
                continue;
            };
            if !env.factory.is_project(child)
                || project.is_dead()
                || self.observed.contains(name)
                || !self.scope.covers_name(project.branch_name())
            {
                continue;
            }
            let owner = project.branch.source_id();
            if !self.may_kill_owned_by(owner) {
                env.progress.line(&format!(
                    "Keeping {}: source {owner} could not be checked",
                    project.branch_name()
                ));
                continue;
            }
            let head = project.branch.head();
            env.progress.line(&format!(
                "{} {} is no longer reported by any source",
                head.pronoun(),
                head.name
            ));
            tracing::info!(child = %name, owner, "marking dead");

            let mut updated = project.clone();
            env.factory.set_branch(&mut updated, kill(&project.branch));
            updated.dead_since = Some(env.now);
            env.factory.decorate(&mut updated);
            dead.push(Staged {
                project: updated,
                change: Change::Dead,
                build: BuildOutcome::NotRequested,
                schedule: None,
                cause: self.cause.clone(),
            });
        }
        for staged in dead {
            self.staged.insert(staged.project.name.clone(), staged);
        }
    }
}
