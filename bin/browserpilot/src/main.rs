mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "browserpilot")]
#[command(about = "Drive a browser extension with a vision model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.browserpilot/config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge and execute tasks sent by the extension
    Serve {
        /// Host to bind to (overrides config server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start the bridge, wait for the extension and run one task
    Run {
        /// Task to perform, in plain language
        #[arg(short, long)]
        task: String,

        /// Seconds to wait for the extension to connect
        #[arg(long, default_value_t = 120)]
        wait: u64,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the resolved configuration status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ if cli.verbose => EnvFilter::new("debug"),
        _ => EnvFilter::new("info"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let paths = commands::paths(cli.config);

    match cli.command {
        Commands::Serve { host, port } => {
            commands::serve::run(&paths, host, port).await?;
        }
        Commands::Run { task, wait, host, port } => {
            commands::run_cmd::run(&paths, &task, wait, host, port).await?;
        }
        Commands::Status => {
            commands::status::run(&paths).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show(&paths).await?;
            }
            ConfigCommands::Init { force } => {
                commands::config_cmd::init(&paths, force).await?;
            }
            ConfigCommands::Path => {
                commands::config_cmd::path(&paths).await?;
            }
        },
    }

    Ok(())
}
