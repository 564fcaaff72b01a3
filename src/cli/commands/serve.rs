//! Daemon mode: recovery sweep, cron timer, then wait for ctrl-c.

use anyhow::Result;

use crate::services::Runtime;

pub async fn handle_serve(mut runtime: Runtime) -> Result<()> {
    let swept = runtime.recover().await?;
    if swept > 0 {
        tracing::info!(swept, "Recovered stale executions");
    }

    runtime.start_cron();
    tracing::info!("taskforge daemon running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    // Give in-flight dispatches a moment before closing storage.
    runtime.drain(std::time::Duration::from_secs(10)).await;
    runtime.shutdown().await?;
    Ok(())
}
