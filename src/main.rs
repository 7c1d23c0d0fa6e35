#![allow(missing_docs)]

//! Groupwarden CLI: run the poll loop or inspect local state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use groupwarden::config::{self, Config, RuntimePaths};
use groupwarden::credentials::{self, Credentials};
use groupwarden::engine::Engine;
use groupwarden::logging;
use groupwarden::platform::client::HttpPlatform;
use groupwarden::platform::Platform;
use groupwarden::poller::Poller;
use groupwarden::protection::{Accounts, Guardian};
use groupwarden::state::{DedupLedger, PrivilegeStore, SnapshotStore};

#[derive(Debug, Parser)]
#[command(name = "groupwarden", version, about = "Moderation bot for group conversations")]
struct Cli {
    /// Path to config.toml (defaults to $GROUPWARDEN_CONFIG or ~/.groupwarden/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the poll loop until interrupted.
    Start,
    /// Print persisted privilege records and admin snapshots.
    Status,
    /// Validate config and credentials without contacting the platform.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path_with(|key| std::env::var(key).ok())?,
    };

    match cli.command {
        Command::Start => start(&config_path).await,
        Command::Status => {
            logging::init_cli();
            status(&config_path)
        }
        Command::Check => {
            logging::init_cli();
            check(&config_path)
        }
    }
}

fn load(config_path: &Path) -> Result<(Config, RuntimePaths)> {
    let config = Config::load(config_path)?;
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let paths = config::runtime_paths(&config, base);
    Ok((config, paths))
}

async fn start(config_path: &Path) -> Result<()> {
    let (config, paths) = load(config_path)?;
    let _guard = logging::init_production(&paths.logs_dir)?;
    info!(version = env!("CARGO_PKG_VERSION"), "groupwarden starting");

    let creds = credentials::load_credentials(&paths.env_file)?;
    let min_users = config.polling.group_min_users;
    let primary: Arc<dyn Platform> = Arc::new(
        HttpPlatform::new(&config.platform, creds.session_id()?, min_users)
            .context("failed to build platform client")?,
    );

    let mut accounts = Accounts::new(Arc::clone(&primary), config.bot.user_id.clone());
    if let Some(session) = creds.assistant_session_id() {
        let assistant = HttpPlatform::new(&config.platform, session, min_users)
            .context("failed to build assistant platform client")?;
        accounts = accounts.with_assistant(Arc::new(assistant), config.assistant.user_id.clone());
        info!("assistant account configured");
    } else {
        warn!("no assistant account configured; remediation depends on the bot keeping admin rights");
    }

    let privileges = PrivilegeStore::open(&paths.privileges, config.bot.developers.clone())
        .context("failed to open privilege store")?;
    let snapshots =
        SnapshotStore::open(&paths.snapshots).context("failed to open admin snapshots")?;
    let ledger = match &paths.ledger {
        Some(path) => DedupLedger::load(path).context("failed to load dedup ledger")?,
        None => DedupLedger::in_memory(),
    };

    let guardian = Guardian::from_config(accounts, snapshots, &config.protection);
    let engine = Engine::new(privileges, guardian, ledger);
    let poller = Poller::new(
        primary,
        engine,
        Duration::from_secs(config.polling.interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    poller.run(shutdown_rx).await;
    info!("groupwarden stopped");
    Ok(())
}

fn status(config_path: &Path) -> Result<()> {
    let (config, paths) = load(config_path)?;
    let privileges = PrivilegeStore::open(&paths.privileges, config.bot.developers)?;
    let snapshots = SnapshotStore::open(&paths.snapshots)?;

    let doc = serde_json::json!({
        "privileges": privileges.records(),
        "snapshots": snapshots.all(),
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn check(config_path: &Path) -> Result<()> {
    let (config, paths) = load(config_path)?;
    println!("config: ok ({})", config_path.display());
    println!("bot: {}", config.bot.user_id);
    println!("developers: {}", config.bot.developers.len());

    let creds: Credentials = credentials::load_credentials(&paths.env_file)?;
    creds.session_id()?;
    println!("credentials: ok ({})", paths.env_file.display());
    println!(
        "assistant session: {}",
        if creds.assistant_session_id().is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    println!("state dir: {}", paths.state_dir.display());
    Ok(())
}
