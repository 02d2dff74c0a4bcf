use browserpilot_core::Paths;
use std::time::Duration;
use tracing::{info, warn};

use super::bridge::Bridge;

/// Run a single task from the command line and print how it ended.
pub async fn run(
    paths: &Paths,
    task: &str,
    wait_secs: u64,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let task = task.trim();
    if task.is_empty() {
        anyhow::bail!("Task must not be empty");
    }

    let config = super::load_config(paths, true)?;
    let Bridge {
        correlator,
        session,
        mut tasks,
        server,
        shutdown_tx,
        addr,
    } = Bridge::start(&config, host, port).await?;

    // Tasks typed into the popup meanwhile are not queued in this mode.
    tokio::spawn(async move {
        while let Some(t) = tasks.recv().await {
            warn!(task = %t, "Ignoring extension task while running a CLI task");
        }
    });

    println!("Waiting for the extension on ws://{}/ws ...", addr);
    if tokio::time::timeout(Duration::from_secs(wait_secs), correlator.wait_connected())
        .await
        .is_err()
    {
        let _ = shutdown_tx.send(());
        anyhow::bail!("Extension did not connect within {}s", wait_secs);
    }

    info!(task = %task, "Extension connected; starting task");
    let report = session.run(task).await;
    if let Err(e) = correlator.send_notice(&report.to_notice()).await {
        warn!(error = %e, "Failed to report task outcome to extension");
    }

    println!();
    println!("Task:    {}", report.task);
    println!("Status:  {} ({})", report.state, report.reason);
    println!("Turns:   {}", report.turns);
    println!("Elapsed: {:.1}s", report.elapsed().num_milliseconds() as f64 / 1000.0);
    if let Some(answer) = &report.answer {
        println!();
        println!("{}", answer);
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = server.await {
        warn!(error = %e, "Extension server ended abnormally");
    }

    if !report.is_done() {
        anyhow::bail!("Task {}: {}", report.state, report.reason);
    }
    Ok(())
}
