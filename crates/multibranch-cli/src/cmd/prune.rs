use crate::output::print_json;
use anyhow::Context;
use multibranch_cli::project;
use multibranch_core::progress::TracingProgress;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, project) = project::open(root)?;
    let removed = project
        .prune_orphans(&TracingProgress)
        .context("failed to prune dead branch projects")?;

    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    if removed.is_empty() {
        println!("Nothing to prune.");
    }
    for name in &removed {
        println!("removed: {name}");
    }
    Ok(())
}
