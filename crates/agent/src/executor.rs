//! Executes typed actions through the correlator, including the click
//! recovery policy.

use browserpilot_channels::{CommandCorrelator, ExecutorReply};
use browserpilot_core::config::SessionConfig;
use browserpilot_core::{Error, ExecutorCommand, MouseButton, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actions::BrowserAction;
use crate::normalizer::CoordinateNormalizer;

/// Result of one action as reported back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub content: String,
    pub success: bool,
    /// Real-space coordinate the action finally landed on.
    pub real: Option<(i64, i64)>,
}

impl ActionOutcome {
    fn ok(content: String, real: Option<(i64, i64)>) -> Self {
        Self {
            content,
            success: true,
            real,
        }
    }

    fn failed(content: String, real: Option<(i64, i64)>) -> Self {
        Self {
            content,
            success: false,
            real,
        }
    }
}

/// Human-readable reason from an `action_result.data` payload.
fn failure_text(data: &Value) -> String {
    match data {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Value::Null => "executor reported failure".to_string(),
        other => other.to_string(),
    }
}

/// `Some(false)` only when the extension explicitly says the element under
/// the pointer is not clickable.
fn clicked_is_clickable(data: &Value) -> Option<bool> {
    data.pointer("/elementInfo/clicked/isClickable")
        .and_then(|v| v.as_bool())
}

fn reply_failure(reply: &ExecutorReply) -> String {
    match reply {
        ExecutorReply::ActionResult { data, .. } => failure_text(data),
        ExecutorReply::Observation { .. } => "empty screenshot".to_string(),
    }
}

pub struct ActionExecutor {
    correlator: Arc<CommandCorrelator>,
    normalizer: Arc<CoordinateNormalizer>,
    click_retry_delta: i64,
    double_click_delay: Duration,
    scroll_step_px: u32,
}

impl ActionExecutor {
    pub fn new(
        correlator: Arc<CommandCorrelator>,
        normalizer: Arc<CoordinateNormalizer>,
        session: &SessionConfig,
    ) -> Self {
        Self {
            correlator,
            normalizer,
            click_retry_delta: session.click_retry_delta,
            double_click_delay: session.double_click_delay(),
            scroll_step_px: session.scroll_step_px,
        }
    }

    /// Dispatch errors (transport, timeout) are returned as `Err`; explicit
    /// executor failures come back as an unsuccessful outcome.
    pub async fn execute(&self, action: &BrowserAction, stagnation: u32) -> Result<ActionOutcome> {
        let command = action.command(&self.normalizer, self.scroll_step_px);
        debug!(kind = action.kind(), command = ?command, "Executing action");

        match (action, &command) {
            (BrowserAction::Click { button, .. }, ExecutorCommand::Click { x, y, .. }) => {
                self.click(*x, *y, *button, stagnation).await
            }
            (BrowserAction::DoubleClick { .. }, ExecutorCommand::Click { x, y, .. }) => {
                self.double_click(*x, *y, &command).await
            }
            (BrowserAction::Screenshot, _) => {
                let reply = self.correlator.dispatch(&command).await?;
                Ok(if reply.is_success() {
                    ActionOutcome::ok("Screenshot taken".to_string(), None)
                } else {
                    ActionOutcome::failed(format!("Screenshot failed: {}", reply_failure(&reply)), None)
                })
            }
            _ => {
                let real = match &command {
                    ExecutorCommand::MouseMove { x, y } => Some((*x, *y)),
                    _ => None,
                };
                let reply = self.correlator.dispatch(&command).await?;
                let done = match &command {
                    ExecutorCommand::MouseMove { x, y } => format!("Moved mouse to ({}, {})", x, y),
                    ExecutorCommand::Type { text } => format!("Typed: {}", text),
                    ExecutorCommand::Key { key } => format!("Pressed key: {}", key),
                    ExecutorCommand::Scroll { direction, amount } => {
                        format!("Scrolled {} by {}px", direction.name(), amount)
                    }
                    ExecutorCommand::Navigate { url } => format!("Navigated to: {}", url),
                    ExecutorCommand::SwitchTab { index } => format!("Switched to tab {}", index),
                    ExecutorCommand::Download { url } => format!("Started download: {}", url),
                    other => format!("Executed {}", other.kind()),
                };
                Ok(if reply.is_success() {
                    ActionOutcome::ok(done, real)
                } else {
                    ActionOutcome::failed(
                        format!("{} failed: {}", action.kind(), reply_failure(&reply)),
                        real,
                    )
                })
            }
        }
    }

    fn verb(button: MouseButton) -> &'static str {
        match button {
            MouseButton::Left => "Clicked",
            MouseButton::Right => "Right-clicked",
            MouseButton::Middle => "Middle-clicked",
        }
    }

    /// Click with offset retries on failure and a Tab follow-up when a
    /// stalled session keeps hitting non-interactive elements.
    async fn click(&self, x: i64, y: i64, button: MouseButton, stagnation: u32) -> Result<ActionOutcome> {
        let verb = Self::verb(button);
        let reply = self.correlator.dispatch(&ExecutorCommand::Click { x, y, button }).await?;

        if !reply.is_success() {
            let reason = reply_failure(&reply);
            warn!(x, y, reason = %reason, "Click failed; retrying with offsets");
            let d = self.click_retry_delta;
            for (dx, dy) in [(0, -d), (0, d), (-d, 0), (d, 0)] {
                let (rx, ry) = (x.saturating_add(dx), y.saturating_add(dy));
                let retry = match self
                    .correlator
                    .dispatch(&ExecutorCommand::Click { x: rx, y: ry, button })
                    .await
                {
                    Ok(r) => r,
                    Err(Error::Timeout(e)) => {
                        warn!(x = rx, y = ry, error = %e, "Offset click timed out");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if retry.is_success() {
                    info!(x = rx, y = ry, "Click succeeded after offset retry");
                    return Ok(ActionOutcome::ok(
                        format!("{} at ({}, {}) after retry with offset", verb, rx, ry),
                        Some((rx, ry)),
                    ));
                }
            }
            return Ok(ActionOutcome::failed(
                format!("Click attempt failed at ({}, {}): {}", x, y, reason),
                Some((x, y)),
            ));
        }

        let data = reply.data().cloned().unwrap_or(Value::Null);
        if clicked_is_clickable(&data) == Some(false) && stagnation >= 1 {
            info!(x, y, stagnation, "Clicked a non-interactive element; pressing Tab");
            let tab = self
                .correlator
                .dispatch(&ExecutorCommand::Key {
                    key: "Tab".to_string(),
                })
                .await?;
            let note = if tab.is_success() {
                "pressed Tab to move focus"
            } else {
                "Tab follow-up failed"
            };
            return Ok(ActionOutcome::ok(
                format!(
                    "{} at ({}, {}); the element was not interactive, {}",
                    verb, x, y, note
                ),
                Some((x, y)),
            ));
        }

        Ok(ActionOutcome::ok(format!("{} at ({}, {})", verb, x, y), Some((x, y))))
    }

    /// Two left clicks at the same real point.
    async fn double_click(&self, x: i64, y: i64, command: &ExecutorCommand) -> Result<ActionOutcome> {
        let first = self.correlator.dispatch(command).await?;
        tokio::time::sleep(self.double_click_delay).await;
        let second = self.correlator.dispatch(command).await?;
        if first.is_success() && second.is_success() {
            Ok(ActionOutcome::ok(format!("Double-clicked at ({}, {})", x, y), Some((x, y))))
        } else {
            let failed = if first.is_success() { &second } else { &first };
            Ok(ActionOutcome::failed(
                format!("Double-click failed at ({}, {}): {}", x, y, reply_failure(failed)),
                Some((x, y)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Resolution;
    use crate::testing::FakeBrowser;
    use browserpilot_core::Error;
    use serde_json::json;

    fn executor(browser: &FakeBrowser) -> ActionExecutor {
        let normalizer = Arc::new(CoordinateNormalizer::new(
            Resolution::new(1024, 768),
            Resolution::new(1280, 800),
        ));
        ActionExecutor::new(browser.correlator(), normalizer, &SessionConfig::default())
    }

    fn left_click(x: i64, y: i64) -> BrowserAction {
        BrowserAction::Click {
            x,
            y,
            button: MouseButton::Left,
        }
    }

    #[tokio::test]
    async fn test_click_is_normalized() {
        let browser = FakeBrowser::new();
        let exec = executor(&browser);
        let outcome = exec.execute(&left_click(512, 384), 0).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.real, Some((640, 400)));
        assert_eq!(outcome.content, "Clicked at (640, 400)");
        assert_eq!(
            browser.commands(),
            vec![json!({"action": "click", "x": 640, "y": 400, "button": "left"})]
        );
    }

    #[tokio::test]
    async fn test_failed_click_retries_offsets_until_success() {
        let browser = FakeBrowser::new();
        // Only the "down" offset succeeds.
        browser.on_click(|x, y| if (x, y) == (640, 405) { json!(true) } else { json!(false) });
        let exec = executor(&browser);
        let outcome = exec.execute(&left_click(512, 384), 0).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.real, Some((640, 405)));
        assert!(outcome.content.contains("after retry with offset"));

        let sent: Vec<(i64, i64)> = browser
            .commands()
            .iter()
            .map(|c| (c["x"].as_i64().unwrap(), c["y"].as_i64().unwrap()))
            .collect();
        assert_eq!(sent, vec![(640, 400), (640, 395), (640, 405)]);
    }

    #[tokio::test]
    async fn test_click_reports_failure_at_original_point() {
        let browser = FakeBrowser::new();
        browser.on_click(|_, _| json!(false));
        let exec = executor(&browser);
        let outcome = exec.execute(&left_click(512, 384), 0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.real, Some((640, 400)));
        assert!(outcome.content.starts_with("Click attempt failed at (640, 400)"));
        assert_eq!(browser.commands().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_offset_click_moves_on_to_next_offset() {
        let browser = FakeBrowser::with_timeout(Duration::from_secs(1));
        // Original fails, "up" never answers, "down" succeeds.
        browser.on_click(|x, y| match (x, y) {
            (640, 400) => json!(false),
            (640, 395) => json!("__silent__"),
            _ => json!(true),
        });
        let exec = executor(&browser);
        let outcome = exec.execute(&left_click(512, 384), 0).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.real, Some((640, 405)));
        assert_eq!(browser.commands().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offsets_that_all_time_out_report_failure_at_original_point() {
        let browser = FakeBrowser::with_timeout(Duration::from_secs(1));
        browser.on_click(|x, y| if (x, y) == (640, 400) { json!(false) } else { json!("__silent__") });
        let exec = executor(&browser);
        let outcome = exec.execute(&left_click(512, 384), 0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.real, Some((640, 400)));
        assert!(outcome.content.starts_with("Click attempt failed at (640, 400)"));
        assert_eq!(browser.commands().len(), 5);
    }

    #[tokio::test]
    async fn test_offsets_near_coordinate_limit_do_not_overflow() {
        let browser = FakeBrowser::new();
        browser.on_click(|_, _| json!(false));
        let normalizer = Arc::new(CoordinateNormalizer::new(
            Resolution::new(1280, 800),
            Resolution::new(1280, 800),
        ));
        let exec = ActionExecutor::new(browser.correlator(), normalizer, &SessionConfig::default());
        let outcome = exec.execute(&left_click(i64::MAX - 1, 10), 0).await.unwrap();
        assert!(!outcome.success);
        let xs: Vec<i64> = browser.commands().iter().map(|c| c["x"].as_i64().unwrap()).collect();
        assert_eq!(xs.len(), 5);
        assert!(xs.iter().all(|&x| x >= i64::MAX - 6));
    }

    #[tokio::test]
    async fn test_non_interactive_click_presses_tab_only_when_stalled() {
        let browser = FakeBrowser::new();
        browser.on_click(|_, _| json!({"elementInfo": {"clicked": {"tag": "DIV", "isClickable": false}}}));
        let exec = executor(&browser);

        exec.execute(&left_click(100, 100), 0).await.unwrap();
        assert_eq!(browser.commands().len(), 1);

        let outcome = exec.execute(&left_click(100, 100), 1).await.unwrap();
        let cmds = browser.commands();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[2], json!({"action": "key", "key": "Tab"}));
        assert!(outcome.content.contains("pressed Tab"));
    }

    #[tokio::test]
    async fn test_missing_clickable_flag_does_not_press_tab() {
        let browser = FakeBrowser::new();
        browser.on_click(|_, _| json!({"elementInfo": {"clicked": {"tag": "A"}}}));
        let exec = executor(&browser);
        exec.execute(&left_click(100, 100), 3).await.unwrap();
        assert_eq!(browser.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_click_sends_two_clicks_at_one_point() {
        let browser = FakeBrowser::new();
        let exec = executor(&browser);
        let outcome = exec
            .execute(&BrowserAction::DoubleClick { x: 512, y: 384 }, 0)
            .await
            .unwrap();
        assert!(outcome.success);
        let cmds = browser.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], cmds[1]);
        assert_eq!(cmds[0]["x"], 640);
    }

    #[tokio::test]
    async fn test_other_failures_are_reported_verbatim() {
        let browser = FakeBrowser::new();
        browser.on_action(|cmd| {
            (cmd["action"] == "type").then(|| (false, json!({"error": "no focused input"})))
        });
        let exec = executor(&browser);
        let outcome = exec
            .execute(&BrowserAction::Type { text: "hi".into() }, 0)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.content, "type failed: no focused input");
    }

    #[tokio::test]
    async fn test_disconnected_executor_is_a_transport_error() {
        let browser = FakeBrowser::new();
        browser.disconnect();
        let exec = executor(&browser);
        let err = exec
            .execute(&BrowserAction::Key { key: "Enter".into() }, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
