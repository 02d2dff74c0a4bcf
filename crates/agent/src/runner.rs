use browserpilot_channels::CommandCorrelator;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::session::{BrowserSession, SessionReport};

/// Runs queued tasks one at a time, in arrival order, and reports each
/// outcome back to the extension.
pub struct TaskRunner {
    session: BrowserSession,
    correlator: Arc<CommandCorrelator>,
}

impl TaskRunner {
    pub fn new(session: BrowserSession, correlator: Arc<CommandCorrelator>) -> Self {
        Self { session, correlator }
    }

    pub async fn run_loop(self, mut tasks: mpsc::Receiver<String>, mut shutdown: broadcast::Receiver<()>) {
        info!("Task runner started");
        loop {
            tokio::select! {
                task = tasks.recv() => {
                    match task {
                        Some(task) => {
                            self.handle(&task).await;
                        }
                        None => {
                            info!("Task queue closed");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Task runner shutting down");
                    break;
                }
            }
        }
    }

    pub async fn handle(&self, task: &str) -> SessionReport {
        let report = self.session.run(task).await;
        if let Err(e) = self.correlator.send_notice(&report.to_notice()).await {
            warn!(error = %e, "Failed to report task outcome to extension");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{CoordinateNormalizer, Resolution};
    use crate::testing::FakeBrowser;
    use async_trait::async_trait;
    use browserpilot_core::{Config, Decision, Result};
    use browserpilot_providers::{DecisionRequest, DecisionService};
    use serde_json::json;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DecisionService for Echo {
        async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision> {
            let task = request.context.to_string();
            self.seen.lock().unwrap().push(task);
            Ok(Decision::Terminal { text: "finished".into() })
        }
    }

    fn runner(browser: &FakeBrowser, decider: Arc<Echo>) -> TaskRunner {
        let config = Config::default();
        let normalizer = Arc::new(CoordinateNormalizer::new(Resolution::new(1024, 768), Resolution::new(1280, 800)));
        let session = BrowserSession::new(&config, browser.correlator(), normalizer, decider);
        TaskRunner::new(session, browser.correlator())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_in_order_until_queue_closes() {
        let browser = FakeBrowser::new();
        let decider = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let (task_tx, task_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        task_tx.send("first task".to_string()).await.unwrap();
        task_tx.send("second task".to_string()).await.unwrap();
        drop(task_tx);

        runner(&browser, decider.clone()).run_loop(task_rx, shutdown_rx).await;

        let seen = decider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("Your task is to: first task."));
        assert!(seen[1].contains("Your task is to: second task."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_idle_runner() {
        let browser = FakeBrowser::new();
        let decider = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let (_task_tx, task_rx) = mpsc::channel::<String>(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(runner(&browser, decider).run_loop(task_rx, shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_reports_outcome() {
        let browser = FakeBrowser::new();
        let decider = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let report = runner(&browser, decider).handle("read the headline").await;
        assert!(report.is_done());
        assert_eq!(report.answer.as_deref(), Some("finished"));
        assert_eq!(
            browser.notices(),
            vec![json!({
                "type": "task_done",
                "task": "read the headline",
                "status": "done",
                "reason": "task complete",
                "answer": "finished",
                "turns": 1
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_survives_missing_link() {
        let browser = FakeBrowser::new();
        browser.disconnect();
        let decider = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let report = runner(&browser, decider).handle("t").await;
        assert!(!report.is_done());
        assert!(browser.notices().is_empty());
    }
}
