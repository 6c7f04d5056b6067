use crate::output::print_json;
use multibranch_cli::project;
use multibranch_core::progress::TracingProgress;
use multibranch_core::{BuildCause, BuildOutcome};
use std::path::Path;

pub fn run(root: &Path, name: &str, user: &str, json: bool) -> anyhow::Result<()> {
    let (_, project) = project::open(root)?;
    let cause = BuildCause::Manual {
        user: user.to_string(),
    };
    let outcome = project.request_build(name, cause, &TracingProgress)?;

    if json {
        return print_json(&outcome);
    }
    match &outcome.build {
        BuildOutcome::Scheduled => println!("Scheduled build of {}", outcome.branch),
        other => anyhow::bail!("build of {} not scheduled: {other}", outcome.branch),
    }
    Ok(())
}
