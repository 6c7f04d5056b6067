use crate::queue::FileQueueScheduler;
use anyhow::Context;
use multibranch_core::config::Config;
use multibranch_core::store::FsStore;
use multibranch_core::MultiBranchProject;
use std::path::Path;
use std::sync::Arc;

/// Open the on-disk container at `root`: configured sources, stored children,
/// file-backed build queue.
pub fn open(root: &Path) -> anyhow::Result<(Config, MultiBranchProject)> {
    let config = Config::load(root).context("failed to load config")?;
    let sources = config.branch_sources(root)?;
    let criteria = config
        .criteria
        .filter()
        .context("invalid branch criteria")?;

    let project = MultiBranchProject::builder(config.name.as_str())
        .sources(sources)
        .store(Arc::new(FsStore::new(root)))
        .scheduler(Arc::new(FileQueueScheduler::new(root)))
        .criteria(Arc::new(criteria))
        .orphan_policy(Arc::new(config.orphans.clone()))
        .build()?;
    let loaded = project.load().context("failed to load branch projects")?;
    tracing::debug!(children = loaded, "opened {}", root.display());
    Ok((config, project))
}
