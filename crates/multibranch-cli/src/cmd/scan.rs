use crate::output::print_report;
use anyhow::Context;
use multibranch_cli::project;
use multibranch_core::progress::BufferedProgress;
use multibranch_core::Cancellation;
use std::path::Path;

pub fn run(root: &Path, log: bool, json: bool) -> anyhow::Result<()> {
    let (_, project) = project::open(root)?;
    let progress = BufferedProgress::new();
    let report = project
        .scan(&progress, &Cancellation::new())
        .context("scan failed")?;

    if log {
        for line in progress.lines() {
            eprintln!("{line}");
        }
    }
    print_report(&report, json)
}
