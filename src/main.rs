use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use redpocket_watch::account::Account;
use redpocket_watch::api::{HttpLiveApi, RoomRef};
use redpocket_watch::config::{CliOverrides, Config};
use redpocket_watch::credential::Credential;
use redpocket_watch::discovery::{DiscoveryResult, RoomDiscoveryLoop};
use redpocket_watch::error::WatchError;
use redpocket_watch::monitor::{MonitorReport, RoomMonitor};
use redpocket_watch::pool::AccountPool;
use redpocket_watch::relay::RelayConnector;

/// Watch live rooms for red packets and claim them with every configured account
#[derive(Parser, Debug)]
#[command(name = "redpocket-watch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (TOML format)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Ignore red packets worth this much or less
    #[arg(long = "price-limit")]
    price_limit: Option<u64>,

    /// Base draw delay in seconds
    #[arg(long = "draw-delay")]
    draw_delay: Option<u64>,

    /// Keep-alive window in milliseconds
    #[arg(long = "close-after-ms")]
    close_after_ms: Option<u64>,

    /// Room list pages scanned per area
    #[arg(long = "pages")]
    pages: Option<u32>,

    /// Rescan the room lists every N seconds
    #[arg(long = "rescan-interval")]
    rescan_interval: Option<u64>,

    /// Only scan the area of this room
    #[arg(long = "focus-room")]
    focus_room: Option<u64>,

    /// Relay URL template containing {room_id}
    #[arg(long = "relay-url")]
    relay_url: Option<String>,

    /// Watch a single room instead of discovering rooms
    #[arg(long = "room", requires = "owner")]
    room: Option<u64>,

    /// Owner of the room given with --room
    #[arg(long = "owner", requires = "room")]
    owner: Option<u64>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

enum Outcome {
    Discovery(DiscoveryResult),
    Room(MonitorReport),
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("redpocket_watch=debug,info")
    } else {
        EnvFilter::new("redpocket_watch=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, WatchError> {
    // Explicit path, else the default location if present, else defaults
    let mut config = match cli.config.clone().or_else(Config::default_path) {
        Some(path) if cli.config.is_some() || path.exists() => Config::from_file(&path)?,
        _ => Config::default(),
    };

    config.merge_cli_args(CliOverrides {
        total_price_limit: cli.price_limit,
        draw_delay_secs: cli.draw_delay,
        close_after_ms: cli.close_after_ms,
        pages: cli.pages,
        rescan_interval_secs: cli.rescan_interval,
        focus_room: cli.focus_room,
        relay_url: cli.relay_url.clone(),
    });

    if config.accounts.is_empty() {
        return Err(WatchError::Config("no accounts configured".to_string()));
    }

    Ok(config)
}

async fn run(
    config: Config,
    room: Option<RoomRef>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<Outcome> {
    let pool = Arc::new(AccountPool::from_cookies(&config.api, &config.accounts).await);
    if pool.is_empty() {
        bail!("none of the configured accounts is usable");
    }
    info!("Claiming with accounts {:?}", pool.ids());
    info!(
        "Price limit: {}, draw delay: {}s, keep-alive: {}ms",
        config.monitor.total_price_limit,
        config.monitor.draw_delay_secs,
        config.monitor.close_after_ms
    );

    let connector = Arc::new(RelayConnector::new(config.feed.relay_url.clone()));

    if let Some(room) = room {
        let monitor = RoomMonitor::new(room, pool)
            .with_config(config.monitor.clone())
            .with_heartbeat(config.heartbeat.clone());
        return tokio::select! {
            report = monitor.run(connector.as_ref()) => {
                Ok(Outcome::Room(report.context("watching room")?))
            }
            _ = shutdown_rx.recv() => {
                warn!("Shutdown signal received");
                Err(WatchError::ShutdownRequested.into())
            }
        };
    }

    let announce_api = HttpLiveApi::new(&config.api, &Credential::parse(&config.announce_cookie))
        .context("building announce client")?;
    let announcer = Account::new(0, Arc::new(announce_api));

    let mut discovery = RoomDiscoveryLoop::new(config, announcer, pool, connector);
    Ok(Outcome::Discovery(discovery.run(shutdown_rx).await))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    // Setup shutdown signal handling
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down...");
        let _ = shutdown_tx_clone.send(());
    });

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let room = cli.room.zip(cli.owner).map(|(room_id, owner_id)| RoomRef { room_id, owner_id });

    match run(config, room, shutdown_rx).await {
        Ok(Outcome::Discovery(DiscoveryResult::Completed { scans, monitors })) => {
            println!(
                "\n{} {} room(s) watched over {} scan(s)",
                "DONE:".green().bold(),
                monitors,
                scans
            );
            std::process::exit(0);
        }
        Ok(Outcome::Discovery(DiscoveryResult::Shutdown { scans, monitors })) => {
            println!(
                "\n{} Shutdown after {} scan(s), {} room(s) watched",
                "INTERRUPTED:".yellow().bold(),
                scans,
                monitors
            );
            std::process::exit(130);
        }
        Ok(Outcome::Room(report)) => {
            let won = report.outcomes.iter().filter(|o| o.claimed).count();
            println!(
                "\n{} Room {} closed: {} red packet(s), {} successful draw(s)",
                "DONE:".green().bold(),
                report.room.room_id.to_string().cyan(),
                report.qualifying_events,
                won
            );
            std::process::exit(0);
        }
        Err(e) if matches!(e.downcast_ref::<WatchError>(), Some(WatchError::ShutdownRequested)) => {
            println!("\n{} Shutdown requested", "INTERRUPTED:".yellow().bold());
            std::process::exit(130);
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
