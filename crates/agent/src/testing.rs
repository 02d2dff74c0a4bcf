//! Scripted browser extension for tests, wired through a real correlator.

use async_trait::async_trait;
use browserpilot_channels::{CommandCorrelator, FrameSink};
use browserpilot_core::{InboundFrame, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::observation::tests::png_base64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScreenshotReply {
    Image,
    Empty,
    /// Never answer.
    Silent,
}

type ClickHandler = Box<dyn Fn(i64, i64) -> Value + Send + Sync>;
type ActionHandler = Box<dyn Fn(&Value) -> Option<(bool, Value)> + Send + Sync>;

struct FakeState {
    commands: Vec<Value>,
    notices: Vec<Value>,
    screenshots: VecDeque<ScreenshotReply>,
    viewport: (u32, u32),
    on_click: Option<ClickHandler>,
    on_action: Option<ActionHandler>,
    /// Drop the link when this command arrives.
    drop_on: Option<String>,
    link_id: u64,
}

struct FakeSink {
    correlator: Weak<CommandCorrelator>,
    png: String,
    state: Mutex<FakeState>,
}

impl FakeSink {
    fn replies(&self, cmd: &Value) -> Vec<InboundFrame> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(cmd.clone());
        let action = cmd["action"].as_str().unwrap_or_default().to_string();

        match action.as_str() {
            "screenshot" => {
                let (w, h) = state.viewport;
                match state.screenshots.pop_front().unwrap_or(ScreenshotReply::Image) {
                    ScreenshotReply::Image => vec![
                        InboundFrame::Screenshot {
                            data: self.png.clone(),
                            width: Some(w),
                            height: Some(h),
                        },
                        // Trailing result the real extension also sends.
                        InboundFrame::ActionResult {
                            action: Some("screenshot".into()),
                            success: true,
                            data: Value::Null,
                        },
                    ],
                    ScreenshotReply::Empty => vec![InboundFrame::Screenshot {
                        data: String::new(),
                        width: None,
                        height: None,
                    }],
                    ScreenshotReply::Silent => vec![],
                }
            }
            "click" => {
                let (x, y) = (cmd["x"].as_i64().unwrap_or(0), cmd["y"].as_i64().unwrap_or(0));
                let (success, data) = match state.on_click.as_ref().map(|f| f(x, y)) {
                    Some(Value::String(s)) if s == "__silent__" => return vec![],
                    Some(Value::Bool(ok)) => (ok, Value::Null),
                    Some(data) => (true, data),
                    None => (true, Value::Null),
                };
                vec![InboundFrame::ActionResult {
                    action: Some(action),
                    success,
                    data,
                }]
            }
            _ => {
                let (success, data) = state
                    .on_action
                    .as_ref()
                    .and_then(|f| f(cmd))
                    .unwrap_or((true, Value::Null));
                if data == Value::String("__silent__".into()) {
                    return vec![];
                }
                vec![InboundFrame::ActionResult {
                    action: Some(action),
                    success,
                    data,
                }]
            }
        }
    }
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&self, text: String) -> Result<()> {
        let cmd: Value = serde_json::from_str(&text)?;
        if cmd.get("type").is_some() {
            self.state.lock().unwrap().notices.push(cmd);
            return Ok(());
        }
        let dropped = {
            let state = self.state.lock().unwrap();
            state.drop_on.is_some() && state.drop_on.as_deref() == cmd["action"].as_str()
        };
        if dropped {
            self.state.lock().unwrap().commands.push(cmd);
            let link_id = self.state.lock().unwrap().link_id;
            if let Some(c) = self.correlator.upgrade() {
                c.detach(link_id);
            }
            return Ok(());
        }
        let frames = self.replies(&cmd);
        let correlator = self.correlator.clone();
        tokio::spawn(async move {
            for frame in frames {
                tokio::task::yield_now().await;
                if let Some(c) = correlator.upgrade() {
                    c.handle_frame(frame);
                }
            }
        });
        Ok(())
    }
}

pub(crate) struct FakeBrowser {
    correlator: Arc<CommandCorrelator>,
    sink: Arc<FakeSink>,
    link_id: u64,
}

impl FakeBrowser {
    pub(crate) fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub(crate) fn with_timeout(timeout: Duration) -> Self {
        let correlator = Arc::new(CommandCorrelator::new(timeout));
        let sink = Arc::new(FakeSink {
            correlator: Arc::downgrade(&correlator),
            png: png_base64(64, 40),
            state: Mutex::new(FakeState {
                commands: Vec::new(),
                notices: Vec::new(),
                screenshots: VecDeque::new(),
                viewport: (1280, 800),
                on_click: None,
                on_action: None,
                drop_on: None,
                link_id: 0,
            }),
        });
        let link_id = correlator.attach(sink.clone());
        sink.state.lock().unwrap().link_id = link_id;
        Self {
            correlator,
            sink,
            link_id,
        }
    }

    pub(crate) fn correlator(&self) -> Arc<CommandCorrelator> {
        self.correlator.clone()
    }

    /// Non-screenshot commands received, in order.
    pub(crate) fn commands(&self) -> Vec<Value> {
        self.all_commands()
            .into_iter()
            .filter(|c| c["action"] != "screenshot")
            .collect()
    }

    pub(crate) fn all_commands(&self) -> Vec<Value> {
        self.sink.state.lock().unwrap().commands.clone()
    }

    /// Notice frames (`task_done`, `response`) sent by the bridge.
    pub(crate) fn notices(&self) -> Vec<Value> {
        self.sink.state.lock().unwrap().notices.clone()
    }

    /// `Value::Bool(b)` answers `success: b`, `"__silent__"` never answers,
    /// and any other value answers success with that value as `data`.
    pub(crate) fn on_click(&self, f: impl Fn(i64, i64) -> Value + Send + Sync + 'static) {
        self.sink.state.lock().unwrap().on_click = Some(Box::new(f));
    }

    /// `None` falls back to success. A `"__silent__"` data value suppresses
    /// the reply entirely.
    pub(crate) fn on_action(&self, f: impl Fn(&Value) -> Option<(bool, Value)> + Send + Sync + 'static) {
        self.sink.state.lock().unwrap().on_action = Some(Box::new(f));
    }

    pub(crate) fn script_screenshots(&self, replies: &[ScreenshotReply]) {
        self.sink.state.lock().unwrap().screenshots.extend(replies.iter().copied());
    }

    pub(crate) fn set_viewport(&self, width: u32, height: u32) {
        self.sink.state.lock().unwrap().viewport = (width, height);
    }

    /// Detach the link as soon as a command of this kind is sent.
    pub(crate) fn disconnect_on(&self, action: &str) {
        self.sink.state.lock().unwrap().drop_on = Some(action.to_string());
    }

    pub(crate) fn disconnect(&self) {
        self.correlator.detach(self.link_id);
    }
}
