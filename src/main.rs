use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rundeckmonitor::config::MonitorConfig;

#[derive(Parser)]
#[command(
    name = "rundeckmonitor",
    about = "Desktop monitor for failed and late Rundeck job executions",
    version,
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor (initial poll, poll loop, control API)
    Run {
        /// Configuration file
        #[arg(long, env = "RUNDECK_MONITOR_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Poll once and print what the monitor would display
    Check {
        /// Configuration file
        #[arg(long, env = "RUNDECK_MONITOR_CONFIG")]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Output file path
        #[arg(long, default_value = "rundeckMonitor.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration with secrets masked
    Show {
        /// Configuration file
        #[arg(long, env = "RUNDECK_MONITOR_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Logging level comes from `RUST_LOG`, else the config file, else `info`.
fn init_tracing(cli: &Cli) {
    let config_path = match &cli.command {
        Commands::Run { config } | Commands::Check { config, .. } => config.clone(),
        Commands::Config {
            action: ConfigAction::Show { config },
        } => config.clone(),
        Commands::Config { .. } => None,
    };
    let logging = std::fs::read_to_string(MonitorConfig::resolve_path(config_path.as_deref()))
        .ok()
        .and_then(|s| toml::from_str::<MonitorConfig>(&s).ok())
        .map(|c| c.logging)
        .unwrap_or_default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if cli.json_logs || logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Commands::Run { config } => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting RundeckMonitor");
            if let Err(e) = rundeckmonitor::run(config.as_deref()).await {
                let reason = format!("{:#}", e);
                tracing::error!(error = %reason, "RundeckMonitor initialization error");
                return Err(e);
            }
        }
        Commands::Check { config, json } => {
            let report = rundeckmonitor::check(config.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nRundeckMonitor check: project {}", report.project);
                println!("Icon: {}", report.icon);
                println!("{:<10} | {:<25} | {:<5} | Description", "Execution", "Started", "Kind");
                println!("{:-<10}-|-{:-<25}-|-{:-<5}-|-{:-<30}", "", "", "", "");
                for entry in &report.entries {
                    let kind = if entry.is_long_running { "LATE" } else { "FAIL" };
                    println!(
                        "{:<10} | {:<25} | {:<5} | {}",
                        entry.execution_id,
                        entry.started_at.to_rfc3339(),
                        kind,
                        entry.description
                    );
                }
                if report.entries.is_empty() {
                    println!("No failed or late executions.");
                }
                println!();
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { output, force } => {
                if output.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
                }
                let sample = MonitorConfig::sample_toml()?;
                std::fs::write(&output, sample)
                    .with_context(|| format!("failed to write {}", output.display()))?;
                println!("Configuration written to {}", output.display());
            }
            ConfigAction::Show { config } => {
                let (path, cfg) = MonitorConfig::load_resolved(config.as_deref())?;
                println!("# {}", path.display());
                print!("{}", cfg.to_masked_toml()?);
            }
        },
    }

    Ok(())
}
