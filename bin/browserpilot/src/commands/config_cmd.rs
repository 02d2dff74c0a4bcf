use browserpilot_core::{Config, Paths};

/// Show the effective configuration as pretty-printed JSON. The API key is
/// masked.
pub async fn show(paths: &Paths) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(paths)?;
    config.apply_env();
    let json = masked(&config)?;

    println!();
    println!("📋 Current Configuration");
    println!("  File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Write a default config file. Refuses to overwrite without `force`.
pub async fn init(paths: &Paths, force: bool) -> anyhow::Result<()> {
    let path = write_default(paths, force)?;
    println!("✓ Config written: {}", path.display());
    Ok(())
}

pub async fn path(paths: &Paths) -> anyhow::Result<()> {
    println!("{}", paths.config_file().display());
    Ok(())
}

fn write_default(paths: &Paths, force: bool) -> anyhow::Result<std::path::PathBuf> {
    let path = paths.config_file();
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }
    paths.ensure_dirs()?;
    Config::default().save(&path)?;
    Ok(path)
}

fn masked(config: &Config) -> anyhow::Result<serde_json::Value> {
    let mut json = serde_json::to_value(config)?;
    if let Some(key) = json.pointer_mut("/provider/apiKey") {
        let shown = key
            .as_str()
            .filter(|k| !k.is_empty())
            .map(|k| {
                let tail: String = k.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
                format!("****{}", tail)
            })
            .unwrap_or_default();
        *key = serde_json::Value::String(shown);
    }
    Ok(json)
}
