use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    config_override: Option<PathBuf>,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".browserpilot"))
            .unwrap_or_else(|| PathBuf::from(".browserpilot"));
        Self {
            base,
            config_override: None,
        }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self {
            base,
            config_override: None,
        }
    }

    /// Point at an explicit config file (`--config`).
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_override = Some(path);
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_override
            .clone()
            .unwrap_or_else(|| self.base.join("config.json"))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        if let Some(parent) = self.config_file().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
