//! axond binary entry point.

use anyhow::{Context, Result};
use axond::config::{self, CONFIG_FILE, DaemonConfig};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "axond", version, about = "Simulation job dispatch and streaming daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway and job runner.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the resolved configuration.
    Config,
    /// Fan-out worker entrypoint, spawned by the executor.
    #[command(hide = true)]
    FanoutChild {
        /// Job kind to run the parameter set under.
        kind: String,
        /// Slot index appended by the parent; the task line on stdin
        /// is authoritative.
        task: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            init_tracing(false);
            let config_dir = config::global_config_dir();
            if !config_dir.join(CONFIG_FILE).exists() {
                config::scaffold_config_dir(&config_dir)?;
                tracing::info!("scaffolded configuration in {}", config_dir.display());
            }
            let mut config = DaemonConfig::load(&config_dir.join(CONFIG_FILE))?;
            if let Some(bind) = bind {
                config.bind = bind;
            }

            let handle = axond::serve_with_config(&config, &config_dir).await?;
            signal::ctrl_c().await?;
            tracing::info!("shutting down");
            handle.shutdown().await
        }
        Command::Config => {
            let config_dir = config::global_config_dir();
            let config_path = config_dir.join(CONFIG_FILE);
            let config = if config_path.exists() {
                DaemonConfig::load(&config_path)?
            } else {
                DaemonConfig::default()
            };
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::FanoutChild { kind, .. } => {
            // Stdout carries the result protocol; logs go to stderr.
            init_tracing(true);
            let kind = acore::JobKind::parse(&kind)
                .with_context(|| format!("unknown job kind: {kind}"))?;
            axond::handlers::run_fanout_child(kind).await
        }
    }
}

fn init_tracing(to_stderr: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    if to_stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}
