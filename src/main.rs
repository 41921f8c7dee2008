use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use gradebook_watch::alert::format::{render_changes, render_report};
use gradebook_watch::alert::sink::{NotificationSink, StdoutSink, WebhookSink};
use gradebook_watch::changes::diff;
use gradebook_watch::config::{Config, ConfigOverrides};
use gradebook_watch::portal::http::ReqwestTransport;
use gradebook_watch::portal::session::SessionManager;
use gradebook_watch::portal::PortalUrls;
use gradebook_watch::scheduler::{Destinations, Intervals, Orchestrator};
use gradebook_watch::server::run_server;
use gradebook_watch::types::Snapshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "gradebook-watch",
    about = "Polls a student gradebook portal and reports grade changes"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run both schedules and the command API until interrupted.
    Run {
        #[arg(long)]
        stdout: bool,
    },
    /// Fetch once and print the full report.
    Report,
    /// Fetch once and print every course as a change against an empty baseline.
    Check {
        #[arg(long)]
        json: bool,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides::from_env());

    match &cli.command {
        Commands::Config { init, show } => handle_config_command(*init, *show, &config, &config_path),
        Commands::Run { stdout } => run(config, *stdout).await,
        Commands::Report => {
            let snapshot = fetch_once(&config).await?;
            println!("{}", render_report(&snapshot));
            Ok(())
        }
        Commands::Check { json } => {
            let snapshot = fetch_once(&config).await?;
            let deltas = diff(&Snapshot::new(), &snapshot);
            if *json {
                println!("{}", serde_json::to_string_pretty(&deltas)?);
            } else {
                println!(
                    "{}",
                    render_changes(&deltas).unwrap_or_else(|| "No changes.".to_string())
                );
            }
            Ok(())
        }
    }
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &PathBuf) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        let mut redacted = config.clone();
        if !redacted.credentials.password.is_empty() {
            redacted.credentials.password = "<redacted>".to_string();
        }
        println!("{}", toml::to_string_pretty(&redacted)?);
    }
    Ok(())
}

fn session_manager(config: &Config) -> Result<SessionManager> {
    let transport = ReqwestTransport::new().context("failed to build portal HTTP client")?;
    Ok(SessionManager::new(
        Arc::new(transport),
        PortalUrls::from(&config.portal),
        config.credentials.clone(),
    ))
}

async fn fetch_once(config: &Config) -> Result<Snapshot> {
    if config.credentials.username.trim().is_empty() {
        return Err(anyhow!("missing configuration: credentials.username"));
    }
    let mut session = session_manager(config)?;
    session
        .fetch_snapshot()
        .await
        .context("failed to fetch gradebook")
}

async fn run(config: Config, stdout: bool) -> Result<()> {
    config.validate()?;
    let sink: Arc<dyn NotificationSink> = if stdout {
        Arc::new(StdoutSink)
    } else {
        Arc::new(WebhookSink::new()?)
    };
    let orchestrator = Orchestrator::new(
        session_manager(&config)?,
        sink,
        Destinations {
            reports: config.destinations.reports.clone(),
            changes: config.destinations.changes.clone(),
        },
        Intervals {
            full_report: Duration::from_secs(config.schedule.report_interval_secs),
            change_check: Duration::from_secs(config.schedule.change_interval_secs),
        },
    );

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;

    let schedules = orchestrator.spawn_schedules();
    let result = tokio::select! {
        served = run_server(Arc::clone(&orchestrator), addr) => served,
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            signal.map_err(anyhow::Error::from)
        }
    };
    for handle in schedules {
        handle.abort();
    }
    if let Err(err) = &result {
        warn!("stopped with error: {err:#}");
    }
    result
}
