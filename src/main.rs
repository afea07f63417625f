//! # ReferBot
//!
//! Messenger referral bot: hands every new sender a referral link, then
//! drip-feeds follow-up messages defined in a Google Sheet.
//!
//! Usage:
//!   referbot                          # Start on the configured port (default 3000)
//!   referbot --port 8080              # Custom port
//!   referbot --config ./referbot.toml # Explicit config file

use anyhow::Result;
use clap::Parser;
use referbot_channels::{MessengerChannel, SheetsSource};
use referbot_core::traits::{MessageTransport, ProgressStore, TemplateSource};
use referbot_core::{Clock, ReferBotConfig, SystemClock};
use referbot_db::ReferralDb;
use referbot_scheduler::{FollowupEngine, spawn_sweeper};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "referbot", version, about = "🔗 ReferBot — Messenger referral bot")]
struct Cli {
    /// Config file (default: ~/.referbot/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "referbot=debug,referbot_scheduler=debug,referbot_gateway=debug,tower_http=debug"
    } else {
        "referbot=info,referbot_scheduler=info,referbot_gateway=info,referbot_channels=info,referbot_db=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => ReferBotConfig::load_from(path)?,
        None => ReferBotConfig::load()?,
    };
    config.apply_env_overrides();
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    // Open database
    let db_path = expand_path(&config.database.path);
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(ReferralDb::open(std::path::Path::new(&db_path))?);
    tracing::info!("💾 Referral database: {} ({} referrals)", db_path, db.count()?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let messenger = MessengerChannel::new(config.messenger.clone());
    if !messenger.is_configured() {
        tracing::warn!("⚠️ PAGE_ACCESS_TOKEN not set, outgoing messages will fail");
    }
    let transport: Arc<dyn MessageTransport> = Arc::new(messenger);

    // Follow-up engine, only with a template sheet
    let (engine, sweeper) = if config.sheet.is_configured() {
        let source: Arc<dyn TemplateSource> = Arc::new(SheetsSource::new(config.sheet.clone()));
        let store: Arc<dyn ProgressStore> = db.clone();
        let engine = Arc::new(FollowupEngine::from_config(
            &config.scheduler,
            source,
            store,
            transport.clone(),
            clock.clone(),
        ));
        let count = engine.warm_up().await;
        tracing::info!("📋 Loaded {count} follow-up templates");
        let sweeper = spawn_sweeper(engine.clone(), config.scheduler.sweep_period());
        (Some(engine), Some(sweeper))
    } else {
        tracing::warn!("⚠️ GOOGLE_SHEET_ID not set, follow-up scheduler disabled");
        (None, None)
    };

    let state = referbot_gateway::AppState {
        config,
        db,
        transport,
        engine,
        clock,
        start_time: std::time::Instant::now(),
    };

    println!("🔗 ReferBot v{}", env!("CARGO_PKG_VERSION"));
    referbot_gateway::start(state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("🛑 Shutdown signal received");
    })
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }
    tracing::info!("👋 ReferBot stopped");
    Ok(())
}
