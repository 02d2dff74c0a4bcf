//! JSON frames exchanged with the browser extension.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by the extension, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Screenshot {
        #[serde(default)]
        data: String,
        /// Viewport size in CSS pixels, when the extension knows it.
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
    ActionResult {
        /// Echo of the command name; absent in older extension builds.
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        data: Value,
    },
    Error {
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        message: String,
    },
    Task {
        #[serde(default)]
        task: Option<String>,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Screenshot { .. } => "screenshot",
            InboundFrame::ActionResult { .. } => "action_result",
            InboundFrame::Error { .. } => "error",
            InboundFrame::Task { .. } => "task",
            InboundFrame::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Commands understood by the extension. Coordinates are always in real
/// (viewport) pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExecutorCommand {
    Screenshot,
    MouseMove { x: i64, y: i64 },
    Click { x: i64, y: i64, button: MouseButton },
    Type { text: String },
    Key { key: String },
    Scroll { direction: ScrollDirection, amount: u32 },
    Navigate { url: String },
    SwitchTab { index: u32 },
    Download { url: String },
}

impl ExecutorCommand {
    /// Wire name, as echoed back in `action_result.action`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Screenshot => "screenshot",
            Self::MouseMove { .. } => "mouse_move",
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Key { .. } => "key",
            Self::Scroll { .. } => "scroll",
            Self::Navigate { .. } => "navigate",
            Self::SwitchTab { .. } => "switch_tab",
            Self::Download { .. } => "download",
        }
    }
}

/// Non-command frames the bridge sends to the extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeNotice {
    Response {
        message: String,
    },
    TaskDone {
        task: String,
        status: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        turns: u32,
    },
}
