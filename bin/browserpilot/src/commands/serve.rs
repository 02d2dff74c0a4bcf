use browserpilot_agent::TaskRunner;
use browserpilot_core::Paths;
use tracing::{info, warn};

use super::bridge::Bridge;

pub async fn run(paths: &Paths, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = super::load_config(paths, true)?;
    let bridge = Bridge::start(&config, host, port).await?;

    println!("browserpilot bridge listening on ws://{}/ws", bridge.addr);
    println!("Load the extension and send a task from its popup. Ctrl+C to stop.");

    let runner = TaskRunner::new(bridge.session, bridge.correlator.clone());
    let runner_handle = tokio::spawn(runner.run_loop(bridge.tasks, bridge.shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = bridge.shutdown_tx.send(());

    for (name, handle) in [("extension_server", bridge.server), ("task_runner", runner_handle)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Task ended abnormally");
        }
    }
    Ok(())
}
