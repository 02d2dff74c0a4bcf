use browserpilot_agent::{BrowserSession, CoordinateNormalizer, Resolution};
use browserpilot_channels::{CommandCorrelator, ExtensionServer};
use browserpilot_core::Config;
use browserpilot_providers::{AnthropicComputerUse, DecisionService, RetryingDecisionService};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Tasks waiting behind the one being executed.
const TASK_QUEUE_CAPACITY: usize = 32;

/// Every long-lived piece of the bridge, wired together.
pub struct Bridge {
    pub correlator: Arc<CommandCorrelator>,
    pub session: BrowserSession,
    pub tasks: mpsc::Receiver<String>,
    pub server: JoinHandle<()>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub addr: String,
}

impl Bridge {
    /// Bind the extension endpoint and start serving it.
    pub async fn start(config: &Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<Self> {
        let host = host.unwrap_or_else(|| config.server.host.clone());
        let port = port.unwrap_or(config.server.port);

        let correlator = Arc::new(CommandCorrelator::new(config.session.command_timeout()));
        let normalizer = Arc::new(CoordinateNormalizer::new(
            Resolution::new(config.display.logical_width, config.display.logical_height),
            Resolution::new(config.display.real_width, config.display.real_height),
        ));
        let provider: Arc<dyn DecisionService> = Arc::new(AnthropicComputerUse::new(&config.provider, &config.display));
        let decider: Arc<dyn DecisionService> = Arc::new(RetryingDecisionService::new(
            provider,
            config.session.llm_max_retries,
            Duration::from_millis(config.session.llm_retry_delay_ms),
        ));
        let session = BrowserSession::new(config, correlator.clone(), normalizer, decider);

        let (task_tx, tasks) = mpsc::channel(TASK_QUEUE_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let listener: TcpListener = ExtensionServer::bind(&host, port).await?;
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| format!("{}:{}", host, port));
        let server = ExtensionServer::new(correlator.clone(), task_tx);
        let server_shutdown_rx = shutdown_tx.subscribe();
        let server = tokio::spawn(async move {
            if let Err(e) = server.serve(listener, server_shutdown_rx).await {
                error!(error = %e, "Extension server stopped");
            }
        });

        info!(
            addr = %addr,
            model = %config.provider.model,
            logical_width = config.display.logical_width,
            logical_height = config.display.logical_height,
            "Bridge ready"
        );

        Ok(Self {
            correlator,
            session,
            tasks,
            server,
            shutdown_tx,
            addr,
        })
    }
}
