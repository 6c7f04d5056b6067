use super::pass::{Pass, PassOutput, Scope};
use super::PassEnv;
use crate::error::Result;

/// Full scan: every configured source, in priority order, then mark dead
/// every child nobody reported.
pub fn reconcile_scan(env: PassEnv<'_>) -> Result<PassOutput> {
    env.progress.phase("Starting branch indexing");
    let output = Pass::new(env, Scope::Full).run()?;
    env.progress.phase(&format!(
        "Finished branch indexing: {} decisions, {} skipped, {} sources failed",
        output.staged.len(),
        output.skipped.len(),
        output.failed_sources.len()
    ));
    Ok(output)
}
