// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! nbtelemetry CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use nbtelemetry::config::{self, CliOptions, ResolvedConfig, Settings};
use nbtelemetry::logging::{init_logging, LogConfig, GLOBAL_METRICS};
use nbtelemetry::notebook::Host;
use nbtelemetry::replay::{load_script, Replay};
use nbtelemetry::server::{self, LogSink, ServerState};
use nbtelemetry::{TelemetryExtension, VERSION};

/// nbtelemetry - notebook activity capture and delivery.
#[derive(Parser, Debug)]
#[command(name = "nbtelemetry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Collector endpoint base URL
    #[arg(long, env = "NBTELEMETRY_COLLECTOR_URL", global = true)]
    collector_url: Option<String>,

    /// Session token sent to the collector
    #[arg(long, env = "NBTELEMETRY_TOKEN", global = true)]
    token: Option<String>,

    /// User id stamped on every envelope
    #[arg(long, env = "NBTELEMETRY_USER_ID", global = true)]
    user_id: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Debug logging including span timings
    #[arg(long, env = "NBTELEMETRY_DEBUG", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the collection server
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "NBTELEMETRY_BIND")]
        bind: Option<String>,
    },

    /// Drive the pipeline from a replay script
    Replay {
        /// Script file (one JSON action per line)
        script: PathBuf,

        /// Override the notebook path of the opened document
        #[arg(long)]
        path: Option<String>,

        /// Time to let in-flight deliveries finish before shutting down
        #[arg(long, default_value_t = 2000)]
        drain_ms: u64,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
    /// Write an example workspace config file
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(&LogConfig::from_flags(cli.verbose, cli.debug))?;

    let cli_options = CliOptions {
        collector_url: cli.collector_url,
        token: cli.token,
        user_id: cli.user_id,
        bind: match &cli.command {
            Commands::Serve { bind } => bind.clone(),
            _ => None,
        },
    };

    match cli.command {
        Commands::Serve { .. } => {
            let config = resolve(cli_options)?;
            run_server(&config).await
        }
        Commands::Replay { script, path, drain_ms } => {
            let config = resolve(cli_options)?;
            run_replay(&config, &script, path, Duration::from_millis(drain_ms)).await
        }
        Commands::Config { action } => handle_config(action, cli_options),
        Commands::Version => {
            println!("nbtelemetry {}", VERSION);
            Ok(())
        }
    }
}

fn resolve(cli_options: CliOptions) -> anyhow::Result<ResolvedConfig> {
    let workspace_root = std::env::current_dir()?;
    let root = config::find_workspace_root(&workspace_root).unwrap_or(workspace_root);
    Ok(config::load_config(&root, cli_options)?)
}

fn handle_config(action: Option<ConfigAction>, cli_options: CliOptions) -> anyhow::Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let config = resolve(cli_options)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(ConfigAction::Init) => {
            let workspace_root = std::env::current_dir()?;
            let path = config::init_config(&workspace_root, None)?;
            println!("{} {}", "Created config file:".green(), path.display());
        }
    }
    Ok(())
}

async fn run_server(config: &ResolvedConfig) -> anyhow::Result<()> {
    let mut state = ServerState::new(Arc::new(LogSink), config.server.metadata.clone());
    if let Some(ref token) = config.token {
        state = state.with_token(token.clone());
    }

    println!(
        "{} {} (base url {})",
        "Collecting events on".cyan(),
        config.server.bind.bright_white(),
        config.server.base_url
    );

    server::run(&config.server, state, shutdown_signal()).await?;
    info!("collection server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_replay(
    config: &ResolvedConfig,
    script: &std::path::Path,
    path: Option<String>,
    drain: Duration,
) -> anyhow::Result<()> {
    let actions = load_script(script)?;

    let settings = Arc::new(Settings::from_config(config));
    let extension = Arc::new(TelemetryExtension::activate(config, settings, Arc::new(Host::new()))?);

    let mut replay = Replay::new(Arc::clone(&extension));
    if let Some(path) = path {
        replay = replay.with_path(path);
    }

    let applied = replay.run(&actions).await?;
    println!("{} {} actions", "Replayed".green(), applied);

    // Sinks retry forever; give outstanding deliveries a bounded window.
    tokio::time::sleep(drain).await;
    extension.shutdown();

    let snapshot = GLOBAL_METRICS.snapshot();
    println!("{} {}", "Events emitted:".cyan(), snapshot.total_events());
    let mut sinks: Vec<_> = snapshot.sinks.iter().collect();
    sinks.sort_by(|a, b| a.0.cmp(b.0));
    for (name, sink) in sinks {
        println!(
            "  {} delivered={} failures={} skipped={} abandoned={}",
            name.bright_white(),
            sink.delivered,
            sink.failures,
            sink.skipped,
            sink.abandoned
        );
    }
    Ok(())
}
