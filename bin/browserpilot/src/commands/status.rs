use browserpilot_core::{Config, Paths};

pub async fn run(paths: &Paths) -> anyhow::Result<()> {
    println!("browserpilot status");
    println!("===================");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found, using defaults)" }
    );

    let mut config = Config::load_or_default(paths)?;
    config.apply_env();

    println!("Model:     {}", config.provider.model);
    println!(
        "API key:   {}",
        if config.has_api_key() { "✓ configured" } else { "✗ missing" }
    );
    println!("Listen:    ws://{}:{}/ws", config.server.host, config.server.port);
    println!();

    let d = &config.display;
    println!("Display:");
    println!("  logical   {}x{}", d.logical_width, d.logical_height);
    println!(
        "  real      {}x{}{}",
        d.real_width,
        d.real_height,
        if d.auto_detect { " (auto-detect)" } else { "" }
    );
    println!();

    let s = &config.session;
    println!("Session:");
    println!("  max turns            {}", s.max_turns);
    println!("  stagnation ceiling   {}", s.stagnation_ceiling);
    println!("  command timeout      {}s", s.command_timeout_secs);
    println!("  model retries        {}", s.llm_max_retries);

    if let Err(e) = config.validate() {
        println!();
        println!("⚠ {}", e);
    } else if !config.has_api_key() {
        println!();
        println!("⚠ Set provider.apiKey or ANTHROPIC_API_KEY before running tasks.");
    }
    Ok(())
}
