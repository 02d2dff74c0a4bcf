//! Typed browser actions parsed from decision-service tool input.

use browserpilot_core::{ActionRequest, Error, ExecutorCommand, MouseButton, Result, ScrollDirection};
use browserpilot_providers::anthropic::{BROWSER_TOOL, COMPUTER_TOOL};
use serde_json::Value;

use crate::normalizer::CoordinateNormalizer;

/// Coordinates are logical until translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAction {
    Screenshot,
    MouseMove { x: i64, y: i64 },
    Click { x: i64, y: i64, button: MouseButton },
    DoubleClick { x: i64, y: i64 },
    Type { text: String },
    Key { key: String },
    Scroll { direction: ScrollDirection, clicks: u32 },
    Navigate { url: String },
    SwitchTab { index: u32 },
    Download { url: String },
}

fn invalid(action: &str, what: &str) -> Error {
    Error::InvalidAction(format!("{}: {}", action, what))
}

fn number(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
}

fn coordinate(input: &Value, action: &str) -> Result<(i64, i64)> {
    let pair = input
        .get("coordinate")
        .and_then(|v| v.as_array())
        .ok_or_else(|| invalid(action, "missing coordinate"))?;
    match pair.as_slice() {
        [x, y] => match (number(x), number(y)) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(invalid(action, "coordinate must be two numbers")),
        },
        _ => Err(invalid(action, "coordinate must be [x, y]")),
    }
}

fn string_field<'a>(input: &'a Value, field: &str, action: &str) -> Result<&'a str> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid(action, &format!("missing {}", field)))
}

/// xdotool key names (what the computer tool emits) to DOM `KeyboardEvent.key`
/// names (what the extension dispatches). Unknown names pass through.
pub fn dom_key_name(key: &str) -> String {
    let mapped = match key.to_ascii_lowercase().as_str() {
        "return" | "enter" | "kp_enter" => "Enter",
        "backspace" => "Backspace",
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        "delete" => "Delete",
        "insert" => "Insert",
        "space" => " ",
        "home" => "Home",
        "end" => "End",
        "page_up" | "prior" => "PageUp",
        "page_down" | "next" => "PageDown",
        "up" => "ArrowUp",
        "down" => "ArrowDown",
        "left" => "ArrowLeft",
        "right" => "ArrowRight",
        _ => return key.to_string(),
    };
    mapped.to_string()
}

/// Prepend `https://` unless the URL already names http(s), then validate.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAction("empty url".to_string()));
    }
    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    url::Url::parse(&candidate)
        .map(|u| u.to_string())
        .map_err(|e| Error::InvalidAction(format!("invalid url '{}': {}", raw, e)))
}

/// Grid-rounded value, e.g. 384 → 380 on a 10px grid.
pub fn snap(v: i64, grid: u32) -> i64 {
    let grid = grid.max(1) as f64;
    ((v as f64 / grid).round() * grid) as i64
}

impl BrowserAction {
    /// Parse one request. Unknown tools and kinds are `UnsupportedAction`;
    /// known kinds with bad parameters are `InvalidAction`.
    pub fn parse(request: &ActionRequest) -> Result<Self> {
        if request.tool != COMPUTER_TOOL && request.tool != BROWSER_TOOL {
            return Err(Error::UnsupportedAction(format!("unknown tool '{}'", request.tool)));
        }
        let input = &request.input;
        let action = input
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidAction("missing action".to_string()))?;

        let parsed = match action {
            "screenshot" => Self::Screenshot,
            "mouse_move" => {
                let (x, y) = coordinate(input, action)?;
                Self::MouseMove { x, y }
            }
            "left_click" | "right_click" | "middle_click" => {
                let (x, y) = coordinate(input, action)?;
                let button = match action {
                    "right_click" => MouseButton::Right,
                    "middle_click" => MouseButton::Middle,
                    _ => MouseButton::Left,
                };
                Self::Click { x, y, button }
            }
            "double_click" => {
                let (x, y) = coordinate(input, action)?;
                Self::DoubleClick { x, y }
            }
            "type" => Self::Type {
                text: string_field(input, "text", action)?.to_string(),
            },
            "key" => {
                let key = string_field(input, "text", action)?.trim();
                if key.is_empty() {
                    return Err(invalid(action, "empty key"));
                }
                Self::Key {
                    key: dom_key_name(key),
                }
            }
            "scroll" => {
                let direction = string_field(input, "scroll_direction", action)?;
                let direction = ScrollDirection::parse(direction)
                    .ok_or_else(|| invalid(action, &format!("unknown direction '{}'", direction)))?;
                let clicks = match input.get("scroll_amount") {
                    None | Some(Value::Null) => 1,
                    Some(v) => v
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| invalid(action, "scroll_amount must be a non-negative integer"))?,
                };
                Self::Scroll { direction, clicks }
            }
            "navigate" => Self::Navigate {
                url: normalize_url(string_field(input, "url", action)?)?,
            },
            "switch_tab" => {
                let index = input
                    .get("index")
                    .and_then(|v| v.as_u64())
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| invalid(action, "index must be a non-negative integer"))?;
                Self::SwitchTab { index }
            }
            "download" => Self::Download {
                url: normalize_url(string_field(input, "url", action)?)?,
            },
            other => return Err(Error::UnsupportedAction(other.to_string())),
        };
        Ok(parsed)
    }

    /// Kind name as the model spells it.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Screenshot => "screenshot",
            Self::MouseMove { .. } => "mouse_move",
            Self::Click { button, .. } => match button {
                MouseButton::Left => "left_click",
                MouseButton::Right => "right_click",
                MouseButton::Middle => "middle_click",
            },
            Self::DoubleClick { .. } => "double_click",
            Self::Type { .. } => "type",
            Self::Key { .. } => "key",
            Self::Scroll { .. } => "scroll",
            Self::Navigate { .. } => "navigate",
            Self::SwitchTab { .. } => "switch_tab",
            Self::Download { .. } => "download",
        }
    }

    /// Logical target of pointer actions.
    pub fn point(&self) -> Option<(i64, i64)> {
        match self {
            Self::MouseMove { x, y } | Self::Click { x, y, .. } | Self::DoubleClick { x, y } => Some((*x, *y)),
            _ => None,
        }
    }

    /// Same action aimed at another logical point. Non-pointer actions are
    /// returned unchanged.
    pub fn retarget(&self, nx: i64, ny: i64) -> Self {
        match self {
            Self::MouseMove { .. } => Self::MouseMove { x: nx, y: ny },
            Self::Click { button, .. } => Self::Click {
                x: nx,
                y: ny,
                button: *button,
            },
            Self::DoubleClick { .. } => Self::DoubleClick { x: nx, y: ny },
            other => other.clone(),
        }
    }

    /// Repetition signature. Typed text contributes only its length.
    pub fn signature(&self, grid: u32) -> String {
        match self {
            Self::Type { text } => format!("type:{}", text.chars().count()),
            other => match other.point() {
                Some((x, y)) => format!("{}@{},{}", other.kind(), snap(x, grid), snap(y, grid)),
                None => other.kind().to_string(),
            },
        }
    }

    /// The single executor command this action maps to. A double-click maps
    /// to the left click that is sent twice.
    pub fn command(&self, normalizer: &CoordinateNormalizer, scroll_step_px: u32) -> ExecutorCommand {
        match self {
            Self::Screenshot => ExecutorCommand::Screenshot,
            Self::MouseMove { x, y } => {
                let (x, y) = normalizer.to_real(*x, *y);
                ExecutorCommand::MouseMove { x, y }
            }
            Self::Click { x, y, button } => {
                let (x, y) = normalizer.to_real(*x, *y);
                ExecutorCommand::Click { x, y, button: *button }
            }
            Self::DoubleClick { x, y } => {
                let (x, y) = normalizer.to_real(*x, *y);
                ExecutorCommand::Click {
                    x,
                    y,
                    button: MouseButton::Left,
                }
            }
            Self::Type { text } => ExecutorCommand::Type { text: text.clone() },
            Self::Key { key } => ExecutorCommand::Key { key: key.clone() },
            Self::Scroll { direction, clicks } => ExecutorCommand::Scroll {
                direction: *direction,
                amount: clicks.saturating_mul(scroll_step_px),
            },
            Self::Navigate { url } => ExecutorCommand::Navigate { url: url.clone() },
            Self::SwitchTab { index } => ExecutorCommand::SwitchTab { index: *index },
            Self::Download { url } => ExecutorCommand::Download { url: url.clone() },
        }
    }

    /// Short history line in logical coordinates.
    pub fn describe(&self) -> String {
        match self {
            Self::Screenshot => "Took a screenshot".to_string(),
            Self::MouseMove { x, y } => format!("Moved mouse to ({}, {})", x, y),
            Self::Click { x, y, button } => match button {
                MouseButton::Left => format!("Clicked at ({}, {})", x, y),
                MouseButton::Right => format!("Right-clicked at ({}, {})", x, y),
                MouseButton::Middle => format!("Middle-clicked at ({}, {})", x, y),
            },
            Self::DoubleClick { x, y } => format!("Double-clicked at ({}, {})", x, y),
            Self::Type { text } => format!("Typed: '{}'", text),
            Self::Key { key } => format!("Pressed key: {}", key),
            Self::Scroll { direction, clicks } => format!("Scrolled {} x{}", direction.name(), clicks),
            Self::Navigate { url } => format!("Navigated to: {}", url),
            Self::SwitchTab { index } => format!("Switched to tab {}", index),
            Self::Download { url } => format!("Downloaded: {}", url),
        }
    }
}
