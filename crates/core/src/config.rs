use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Extended-thinking budget. `None` or 0 disables thinking.
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: Option<u32>,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_thinking_budget() -> Option<u32> {
    Some(1024)
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            thinking_budget: default_thinking_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    8765
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Logical resolution is what the decision service is told it sees; real
/// resolution is the browser viewport the extension clicks in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    #[serde(default = "default_logical_width")]
    pub logical_width: u32,
    #[serde(default = "default_logical_height")]
    pub logical_height: u32,
    #[serde(default = "default_real_width")]
    pub real_width: u32,
    #[serde(default = "default_real_height")]
    pub real_height: u32,
    /// Update the real resolution from the sizes reported with each screenshot.
    #[serde(default = "default_true")]
    pub auto_detect: bool,
}

fn default_logical_width() -> u32 {
    1024
}

fn default_logical_height() -> u32 {
    768
}

fn default_real_width() -> u32 {
    1280
}

fn default_real_height() -> u32 {
    800
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            logical_width: default_logical_width(),
            logical_height: default_logical_height(),
            real_width: default_real_width(),
            real_height: default_real_height(),
            auto_detect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_stagnation_ceiling")]
    pub stagnation_ceiling: u32,
    #[serde(default = "default_recent_action_window")]
    pub recent_action_window: usize,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Pixel offset (real space) used by the click retry policy.
    #[serde(default = "default_click_retry_delta")]
    pub click_retry_delta: i64,
    /// Grid size (logical pixels) for repetition signatures and click jitter.
    #[serde(default = "default_repetition_grid")]
    pub repetition_grid: u32,
    #[serde(default = "default_double_click_delay_ms")]
    pub double_click_delay_ms: u64,
    /// Pixels scrolled per scroll "click" requested by the model.
    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: u32,
    #[serde(default = "default_transport_retry_delay_ms")]
    pub transport_retry_delay_ms: u64,
    #[serde(default = "default_max_consecutive_timeout_turns")]
    pub max_consecutive_timeout_turns: u32,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
}

fn default_max_turns() -> u32 {
    20
}

fn default_stagnation_ceiling() -> u32 {
    4
}

fn default_recent_action_window() -> usize {
    5
}

fn default_command_timeout_secs() -> u64 {
    10
}

fn default_click_retry_delta() -> i64 {
    5
}

fn default_repetition_grid() -> u32 {
    10
}

fn default_double_click_delay_ms() -> u64 {
    100
}

fn default_scroll_step_px() -> u32 {
    100
}

fn default_transport_retry_delay_ms() -> u64 {
    3000
}

fn default_max_consecutive_timeout_turns() -> u32 {
    3
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            stagnation_ceiling: default_stagnation_ceiling(),
            recent_action_window: default_recent_action_window(),
            command_timeout_secs: default_command_timeout_secs(),
            click_retry_delta: default_click_retry_delta(),
            repetition_grid: default_repetition_grid(),
            double_click_delay_ms: default_double_click_delay_ms(),
            scroll_step_px: default_scroll_step_px(),
            transport_retry_delay_ms: default_transport_retry_delay_ms(),
            max_consecutive_timeout_turns: default_max_consecutive_timeout_turns(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn transport_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transport_retry_delay_ms)
    }

    pub fn double_click_delay(&self) -> Duration {
        Duration::from_millis(self.double_click_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill an empty API key from `ANTHROPIC_API_KEY`.
    pub fn apply_env(&mut self) {
        if self.provider.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
                self.provider.api_key = key.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.display;
        if d.logical_width == 0 || d.logical_height == 0 {
            return Err(Error::Config(format!(
                "logical resolution must be positive, got {}x{}",
                d.logical_width, d.logical_height
            )));
        }
        if d.real_width == 0 || d.real_height == 0 {
            return Err(Error::Config(format!(
                "real resolution must be positive, got {}x{}",
                d.real_width, d.real_height
            )));
        }
        let s = &self.session;
        if s.max_turns == 0 {
            return Err(Error::Config("session.maxTurns must be at least 1".to_string()));
        }
        if s.stagnation_ceiling == 0 {
            return Err(Error::Config("session.stagnationCeiling must be at least 1".to_string()));
        }
        if s.repetition_grid == 0 {
            return Err(Error::Config("session.repetitionGrid must be at least 1".to_string()));
        }
        if s.command_timeout_secs == 0 {
            return Err(Error::Config("session.commandTimeoutSecs must be at least 1".to_string()));
        }
        if s.max_consecutive_timeout_turns == 0 {
            return Err(Error::Config(
                "session.maxConsecutiveTimeoutTurns must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.provider.api_key.trim().is_empty()
    }
}
