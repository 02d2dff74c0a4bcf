//! Pairs commands sent to the browser extension with the replies it sends back.
//!
//! The extension's wire protocol carries no correlation id, so at most one
//! command may be in flight: `dispatch` callers queue on a fair (FIFO) gate,
//! and the reader task resolves the single pending slot when a reply frame
//! arrives.

use async_trait::async_trait;
use browserpilot_core::{BridgeNotice, Error, ExecutorCommand, InboundFrame, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Outbound half of an extension connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;
}

#[async_trait]
impl FrameSink for mpsc::Sender<String> {
    async fn send_text(&self, text: String) -> Result<()> {
        self.send(text)
            .await
            .map_err(|_| Error::Transport("extension writer closed".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorReply {
    Observation {
        data: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    ActionResult {
        success: bool,
        data: Value,
    },
}

impl ExecutorReply {
    pub fn is_success(&self) -> bool {
        match self {
            ExecutorReply::Observation { data, .. } => !data.is_empty(),
            ExecutorReply::ActionResult { success, .. } => *success,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ExecutorReply::ActionResult { data, .. } => Some(data),
            ExecutorReply::Observation { .. } => None,
        }
    }
}

/// What `handle_frame` did with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Delivered to the pending dispatch.
    Resolved,
    /// An `action_result` naming a different command than the pending one.
    Stale,
    /// A reply arrived with nothing pending.
    Unsolicited,
    /// Not a reply kind (`error`, `task`, unknown).
    Ignored,
}

struct PendingCommand {
    kind: &'static str,
    issued_at: Instant,
    reply_tx: oneshot::Sender<ExecutorReply>,
}

struct Link {
    id: u64,
    sink: Arc<dyn FrameSink>,
}

pub struct CommandCorrelator {
    link: Mutex<Option<Link>>,
    next_link_id: AtomicU64,
    /// FIFO single-flight gate; held for the whole send/await of one command.
    gate: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingCommand>>,
    connected: watch::Sender<bool>,
    timeout: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CommandCorrelator {
    pub fn new(timeout: Duration) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            link: Mutex::new(None),
            next_link_id: AtomicU64::new(1),
            gate: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            connected,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attach a new extension link, replacing any previous one. Returns the
    /// link id to pass to [`detach`](Self::detach).
    pub fn attach(&self, sink: Arc<dyn FrameSink>) -> u64 {
        let id = self.next_link_id.fetch_add(1, Ordering::SeqCst);
        let replaced = lock(&self.link).replace(Link { id, sink }).is_some();
        if replaced {
            // Whatever was in flight went to the old connection.
            self.fail_pending();
            warn!(link_id = id, "Extension link replaced by a new connection");
        } else {
            info!(link_id = id, "Extension link attached");
        }
        self.connected.send_replace(true);
        id
    }

    /// Detach the link if it is still the current one.
    pub fn detach(&self, link_id: u64) {
        let mut link = lock(&self.link);
        if link.as_ref().map(|l| l.id) != Some(link_id) {
            return;
        }
        *link = None;
        drop(link);
        self.fail_pending();
        self.connected.send_replace(false);
        info!(link_id, "Extension link detached");
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// True while a command is awaiting its reply.
    pub fn is_busy(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Wait until an extension link is attached.
    pub async fn wait_connected(&self) {
        let mut rx = self.connected.subscribe();
        let _ = rx.wait_for(|connected| *connected).await;
    }

    fn current_sink(&self) -> Option<Arc<dyn FrameSink>> {
        lock(&self.link).as_ref().map(|l| l.sink.clone())
    }

    /// Dropping the sender wakes the waiting dispatch with a closed channel.
    fn fail_pending(&self) {
        if let Some(pending) = lock(&self.pending).take() {
            debug!(action = pending.kind, "Dropping pending command");
        }
    }

    /// Send one command and wait for its reply.
    pub async fn dispatch(&self, command: &ExecutorCommand) -> Result<ExecutorReply> {
        let _turn = self.gate.lock().await;

        let sink = self.current_sink().ok_or(Error::NotConnected)?;
        let kind = command.kind();
        let payload = serde_json::to_string(command)?;

        // Arm before sending so a fast reply cannot slip past.
        let (reply_tx, reply_rx) = oneshot::channel();
        *lock(&self.pending) = Some(PendingCommand {
            kind,
            issued_at: Instant::now(),
            reply_tx,
        });

        debug!(action = kind, "Sending command to extension");
        if let Err(e) = sink.send_text(payload).await {
            lock(&self.pending).take();
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::Transport(format!(
                "extension disconnected while awaiting '{}'",
                kind
            ))),
            Err(_) => {
                lock(&self.pending).take();
                warn!(action = kind, timeout_ms = self.timeout.as_millis() as u64, "Extension did not respond in time");
                Err(Error::Timeout(format!(
                    "extension did not answer '{}' within {}s",
                    kind,
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }

    /// Send a notice frame. Notices expect no reply and bypass the gate.
    pub async fn send_notice(&self, notice: &BridgeNotice) -> Result<()> {
        let sink = self.current_sink().ok_or(Error::NotConnected)?;
        sink.send_text(serde_json::to_string(notice)?).await
    }

    /// Route one inbound frame from the reader task.
    pub fn handle_frame(&self, frame: InboundFrame) -> FrameOutcome {
        let (echo, reply) = match frame {
            InboundFrame::Screenshot {
                data,
                width,
                height,
            } => {
                debug!(bytes = data.len(), ?width, ?height, "Screenshot received");
                (None, ExecutorReply::Observation { data, width, height })
            }
            InboundFrame::ActionResult {
                action,
                success,
                data,
            } => {
                debug!(action = ?action, success, "Action result received");
                (action, ExecutorReply::ActionResult { success, data })
            }
            InboundFrame::Error { action, message } => {
                warn!(action = ?action, message = %message, "Extension reported an error");
                return FrameOutcome::Ignored;
            }
            other => {
                debug!(kind = other.kind(), "Ignoring non-reply frame");
                return FrameOutcome::Ignored;
            }
        };

        let mut slot = lock(&self.pending);
        let Some(pending) = slot.take() else {
            debug!(echo = ?echo, "Reply arrived with no command pending; dropped");
            return FrameOutcome::Unsolicited;
        };
        if let Some(echo) = echo.as_deref() {
            if echo != pending.kind {
                debug!(echo, pending = pending.kind, "Stale reply for an earlier command; dropped");
                *slot = Some(pending);
                return FrameOutcome::Stale;
            }
        }
        // A screenshot is answered by its image or by a failure. A successful
        // result is the trailer of an earlier capture.
        if pending.kind == "screenshot" && matches!(reply, ExecutorReply::ActionResult { success: true, .. }) {
            debug!("Trailing screenshot result while a capture is pending; dropped");
            *slot = Some(pending);
            return FrameOutcome::Stale;
        }
        drop(slot);

        debug!(
            action = pending.kind,
            elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
            "Command resolved"
        );
        // The receiver may already be gone if the timeout fired concurrently.
        let _ = pending.reply_tx.send(reply);
        FrameOutcome::Resolved
    }
}
