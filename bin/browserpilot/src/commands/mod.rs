pub mod bridge;
pub mod config_cmd;
pub mod run_cmd;
pub mod serve;
pub mod status;

use browserpilot_core::{Config, Paths};
use std::path::PathBuf;

pub fn paths(config_override: Option<PathBuf>) -> Paths {
    match config_override {
        Some(path) => Paths::new().with_config_file(path),
        None => Paths::new(),
    }
}

/// Load, apply the environment override and validate. Commands that talk
/// to the model also need an API key.
pub fn load_config(paths: &Paths, require_key: bool) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(paths)?;
    config.apply_env();
    config.validate()?;
    if require_key && !config.has_api_key() {
        anyhow::bail!(
            "No API key configured. Set provider.apiKey in {} or export ANTHROPIC_API_KEY.",
            paths.config_file().display()
        );
    }
    Ok(config)
}
