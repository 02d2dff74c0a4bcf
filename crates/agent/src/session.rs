//! The observe → decide → execute loop for one task.

use browserpilot_channels::{CommandCorrelator, ExecutorReply};
use browserpilot_core::config::SessionConfig;
use browserpilot_core::{
    ActionRequest, ActionResultEntry, BridgeNotice, Config, Decision, Error, ExecutorCommand, Observation, Result,
    Transcript, TranscriptEntry,
};
use browserpilot_providers::{DecisionRequest, DecisionService};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::actions::BrowserAction;
use crate::context::{build_context, ActionRecord, RecentActions};
use crate::executor::ActionExecutor;
use crate::normalizer::CoordinateNormalizer;
use crate::observation;
use crate::stagnation::{batch_signature, jitter_offset, ClickStreak, StagnationTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Observing,
    Deciding,
    Executing,
    Done,
    Aborted,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Observing => write!(f, "observing"),
            SessionState::Deciding => write!(f, "deciding"),
            SessionState::Executing => write!(f, "executing"),
            SessionState::Done => write!(f, "done"),
            SessionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Short id used to correlate log lines of one task.
    pub id: String,
    pub task: String,
    pub state: SessionState,
    pub reason: String,
    pub turns: u32,
    pub answer: Option<String>,
    pub stagnation: u32,
    pub transcript_len: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn to_notice(&self) -> BridgeNotice {
        BridgeNotice::TaskDone {
            task: self.task.clone(),
            status: self.state.to_string(),
            reason: self.reason.clone(),
            answer: self.answer.clone(),
            turns: self.turns,
        }
    }
}

/// Per-task mutable state; dropped when the task ends.
struct TaskState {
    id: String,
    started_at: DateTime<Utc>,
    task: String,
    state: SessionState,
    transcript: Transcript,
    stagnation: StagnationTracker,
    streak: ClickStreak,
    recent: RecentActions,
    timeout_turns: u32,
    turns: u32,
}

impl TaskState {
    fn enter(&mut self, next: SessionState) {
        debug!(task_id = %self.id, turn = self.turns, from = %self.state, to = %next, "Session state");
        self.state = next;
    }

    fn finish(self, state: SessionState, reason: impl Into<String>, answer: Option<String>) -> SessionReport {
        let reason = reason.into();
        match state {
            SessionState::Done => info!(task_id = %self.id, turns = self.turns, reason = %reason, "Task finished"),
            _ => warn!(task_id = %self.id, turns = self.turns, reason = %reason, "Task aborted"),
        }
        SessionReport {
            id: self.id,
            task: self.task,
            state,
            reason,
            turns: self.turns,
            answer,
            stagnation: self.stagnation.counter(),
            transcript_len: self.transcript.len(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// What executing one batch produced.
struct BatchOutcome {
    results: Vec<ActionResultEntry>,
    last_click: Option<(i64, i64)>,
    dispatched: u32,
    timed_out: u32,
    /// Set when the executor link stayed down through the retry.
    fatal: Option<Error>,
}

pub struct BrowserSession {
    correlator: Arc<CommandCorrelator>,
    normalizer: Arc<CoordinateNormalizer>,
    decider: Arc<dyn DecisionService>,
    executor: ActionExecutor,
    settings: SessionConfig,
    auto_detect: bool,
}

impl BrowserSession {
    pub fn new(
        config: &Config,
        correlator: Arc<CommandCorrelator>,
        normalizer: Arc<CoordinateNormalizer>,
        decider: Arc<dyn DecisionService>,
    ) -> Self {
        let executor = ActionExecutor::new(correlator.clone(), normalizer.clone(), &config.session);
        Self {
            correlator,
            normalizer,
            decider,
            executor,
            settings: config.session.clone(),
            auto_detect: config.display.auto_detect,
        }
    }

    fn retry_delay(&self) -> Duration {
        self.settings.transport_retry_delay()
    }

    /// Run one task to completion. Never panics on executor or decision
    /// failures; they end the session with a reason instead.
    pub async fn run(&self, task: &str) -> SessionReport {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        info!(task_id = %id, task = %task, max_turns = self.settings.max_turns, "Starting task");
        let mut st = TaskState {
            id,
            started_at: Utc::now(),
            task: task.to_string(),
            state: SessionState::Idle,
            transcript: Transcript::new(task),
            stagnation: StagnationTracker::new(),
            streak: ClickStreak::new(),
            recent: RecentActions::new(self.settings.recent_action_window),
            timeout_turns: 0,
            turns: 0,
        };

        loop {
            st.turns += 1;
            let turn = st.turns;

            st.enter(SessionState::Observing);
            let observation = match self.observe().await {
                Ok(o) => o,
                Err(e) => {
                    error!(turn, error = %e, "Observation failed twice");
                    return st.finish(SessionState::Aborted, format!("observation failed: {}", e), None);
                }
            };

            st.enter(SessionState::Deciding);
            let context = build_context(&st.task, turn, &st.recent, st.stagnation.counter());
            let decision = self
                .decider
                .decide(DecisionRequest {
                    transcript: &st.transcript,
                    observation: &observation,
                    context: &context,
                })
                .await;

            let (text, requests, raw) = match decision {
                Err(e) => {
                    error!(turn, error = %e, "Decision service failed");
                    return st.finish(SessionState::Aborted, format!("decision service error: {}", e), None);
                }
                Ok(Decision::Terminal { text }) => {
                    st.transcript.push(TranscriptEntry::AgentResponse {
                        text: Some(text.clone()),
                        requests: Vec::new(),
                        raw: None,
                    });
                    return st.finish(SessionState::Done, "task complete", Some(text));
                }
                Ok(Decision::Actions { text, requests, raw }) if requests.is_empty() => {
                    st.transcript.push(TranscriptEntry::AgentResponse {
                        text: text.clone(),
                        requests: Vec::new(),
                        raw,
                    });
                    return st.finish(SessionState::Done, "no actions requested", text);
                }
                Ok(Decision::Actions { text, requests, raw }) => (text, requests, raw),
            };

            info!(turn, actions = requests.len(), "Executing action batch");
            st.transcript.push(TranscriptEntry::AgentResponse {
                text: text.clone(),
                requests: requests.clone(),
                raw,
            });

            st.enter(SessionState::Executing);
            let batch = self.execute_batch(&requests, &mut st).await;
            st.transcript.push(TranscriptEntry::ActionResults { results: batch.results });

            if let Some(e) = batch.fatal {
                return st.finish(SessionState::Aborted, format!("executor connection lost: {}", e), None);
            }

            st.streak.end_turn(batch.last_click);

            if batch.dispatched > 0 && batch.timed_out == batch.dispatched {
                st.timeout_turns += 1;
                warn!(turn, consecutive = st.timeout_turns, "Every action this turn timed out");
            } else {
                st.timeout_turns = 0;
            }
            let timeout_turns = st.timeout_turns;
            if timeout_turns >= self.settings.max_consecutive_timeout_turns {
                return st.finish(
                    SessionState::Aborted,
                    format!("executor timed out on {} consecutive turns", timeout_turns),
                    None,
                );
            }

            let signature = batch_signature(&requests, self.settings.repetition_grid);
            let stagnation = st.stagnation.observe(&signature);
            debug!(turn, signature = %signature, stagnation, "Batch signature");
            if stagnation >= self.settings.stagnation_ceiling {
                return st.finish(
                    SessionState::Aborted,
                    format!("stagnation ceiling reached ({} repeated turns)", stagnation),
                    None,
                );
            }

            if turn >= self.settings.max_turns {
                return st.finish(
                    SessionState::Aborted,
                    format!("turn limit reached ({})", self.settings.max_turns),
                    text,
                );
            }
        }
    }

    /// Capture a screenshot, retrying once after the fixed delay.
    async fn observe(&self) -> Result<Observation> {
        match self.capture().await {
            Ok(o) => Ok(o),
            Err(e) => {
                warn!(
                    error = %e,
                    delay_ms = self.retry_delay().as_millis() as u64,
                    "Observation failed; retrying once"
                );
                tokio::time::sleep(self.retry_delay()).await;
                self.capture().await
            }
        }
    }

    async fn capture(&self) -> Result<Observation> {
        match self.correlator.dispatch(&ExecutorCommand::Screenshot).await? {
            ExecutorReply::Observation { data, width, height } => {
                if data.is_empty() {
                    return Err(Error::ExecutorFailure("empty screenshot".to_string()));
                }
                if self.auto_detect {
                    if let (Some(w), Some(h)) = (width, height) {
                        self.normalizer.observe_viewport(w, h);
                    }
                }
                observation::prepare(&data, self.normalizer.logical())
            }
            ExecutorReply::ActionResult { success, data } => Err(Error::ExecutorFailure(format!(
                "screenshot answered without an image (success={}, data={})",
                success, data
            ))),
        }
    }

    async fn execute_batch(&self, requests: &[ActionRequest], st: &mut TaskState) -> BatchOutcome {
        let grid = self.settings.repetition_grid;
        let stagnation = st.stagnation.counter();
        let mut out = BatchOutcome {
            results: Vec::with_capacity(requests.len()),
            last_click: None,
            dispatched: 0,
            timed_out: 0,
            fatal: None,
        };

        for request in requests {
            let action = match BrowserAction::parse(request) {
                Ok(a) => a,
                Err(e) => {
                    warn!(id = %request.id, tool = %request.tool, error = %e, "Skipping unknown action");
                    let content = format!("Unknown action: {}", request.action_name());
                    st.recent.push(ActionRecord {
                        kind: request.action_name().to_string(),
                        logical: None,
                        real: None,
                        summary: format!("Requested {}", request.action_name()),
                        outcome: content.clone(),
                        success: false,
                    });
                    out.results.push(ActionResultEntry {
                        call_id: request.id.clone(),
                        content,
                        is_error: true,
                    });
                    continue;
                }
            };

            // Jitter repeated clicks; history and signatures keep the requested point.
            let mut target = action.clone();
            if let BrowserAction::Click { x, y, .. } = action {
                let cell = ClickStreak::cell(x, y, grid);
                let n = st.streak.streak_for(cell);
                if n >= 2 {
                    let (dx, dy) = jitter_offset(n);
                    info!(x, y, dx, dy, streak = n, "Jittering repeated click");
                    target = action.retarget(x.saturating_add(dx), y.saturating_add(dy));
                }
                out.last_click = Some(cell);
            }

            out.dispatched += 1;
            let result = match self.executor.execute(&target, stagnation).await {
                Err(e) if e.is_transport() => {
                    warn!(
                        kind = action.kind(),
                        error = %e,
                        delay_ms = self.retry_delay().as_millis() as u64,
                        "Executor link problem; retrying action once"
                    );
                    tokio::time::sleep(self.retry_delay()).await;
                    self.executor.execute(&target, stagnation).await
                }
                other => other,
            };

            let (content, success, real) = match result {
                Ok(outcome) => (outcome.content, outcome.success, outcome.real),
                Err(e) if e.is_transport() => {
                    error!(kind = action.kind(), error = %e, "Executor still unreachable");
                    out.results.push(ActionResultEntry {
                        call_id: request.id.clone(),
                        content: format!("Error executing {}: {}", action.kind(), e),
                        is_error: true,
                    });
                    out.fatal = Some(e);
                    return out;
                }
                Err(e) => {
                    if matches!(e, Error::Timeout(_)) {
                        out.timed_out += 1;
                    }
                    warn!(kind = action.kind(), error = %e, "Action failed");
                    (format!("Error executing {}: {}", action.kind(), e), false, None)
                }
            };

            st.recent.push(ActionRecord {
                kind: action.kind().to_string(),
                logical: action.point(),
                real,
                summary: action.describe(),
                outcome: content.clone(),
                success,
            });
            out.results.push(ActionResultEntry {
                call_id: request.id.clone(),
                content,
                is_error: !success,
            });
        }

        out
    }
}
