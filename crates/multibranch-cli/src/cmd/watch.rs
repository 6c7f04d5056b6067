use anyhow::Context;
use multibranch_cli::project;
use multibranch_core::dispatch::Dispatcher;
use multibranch_core::progress::TracingProgress;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn run(root: &Path, interval: u64) -> anyhow::Result<()> {
    if interval == 0 {
        anyhow::bail!("--interval must be at least 1 second");
    }
    let (config, project) = project::open(root)?;
    let dispatcher = Dispatcher::new(Arc::new(TracingProgress));
    dispatcher.register(Arc::new(project));

    println!(
        "Watching {} every {interval}s (Ctrl-C to stop)",
        config.name
    );
    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    rt.block_on(async {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("could not listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };
        dispatcher
            .run_periodic(Duration::from_secs(interval), shutdown)
            .await;
    });
    Ok(())
}
