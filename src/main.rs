//! Vendagent - on-machine agent for card-payment vending machines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vendagent as app;

use app::board::{DispenseOrchestrator, DispenserBus};
use app::checkout::TransactionCoordinator;
use app::config::{AppConfig, ConfigLoadResult};
use app::db;
use app::http::{self, AppState};
use app::ledger::SaleLedger;
use app::pos::{PosClient, PosRequest};
use app::sync::CloudSync;

/// On-machine agent for card-payment vending machines.
#[derive(Parser)]
#[command(name = "vendagent")]
struct Cli {
    /// Use config.toml from current directory (dev mode)
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_appender = tracing_appender::rolling::daily("logs", "vendagent.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    tracing::info!("Vendagent starting...");

    let config_path = if cli.dev {
        tracing::info!("Dev mode: loading config from current directory");
        PathBuf::from("config.toml")
    } else {
        AppConfig::default_path()
    };
    tracing::info!("Config path: {:?}", config_path);

    let config = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => {
            tracing::info!("Config loaded successfully");
            config
        }
        ConfigLoadResult::Missing => {
            AppConfig::default()
                .save(&config_path)
                .context("failed to write config template")?;
            tracing::warn!(
                "No config found; wrote a template to {:?}. Edit it and restart.",
                config_path
            );
            return Ok(());
        }
        ConfigLoadResult::Invalid(e) => {
            anyhow::bail!("config at {:?} is invalid: {e}", config_path);
        }
    };

    let db = db::connect(&config.database.connection_string())
        .await
        .context("failed to open local database")?;
    db::connection::test_connection(&db)
        .await
        .context("local database did not answer ping")?;
    db::init_schema(&db).await.context("failed to create schema")?;

    let bus = Arc::new(DispenserBus::open(&config.serial));
    if let Err(e) = bus.enable_controller().await {
        tracing::warn!("Controller enable failed: {e}");
    }

    let pos = Arc::new(PosClient::new(&config.pos).context("failed to build POS client")?);
    match pos.request(&PosRequest::init()).await {
        Ok(resp) => tracing::info!("Terminal init: {:?}", resp.response_type),
        Err(e) => tracing::warn!("Terminal not reachable at startup: {e}"),
    }

    let ledger = if config.cloud.api_url.is_empty() {
        tracing::warn!("Cloud API not configured; sales will not be recorded");
        None
    } else {
        let cloud = Arc::new(CloudSync::new(&config.cloud, &config.machine.id, db.clone())?);
        if let Err(e) = cloud.fetch_planogram().await {
            tracing::warn!("Startup planogram fetch failed: {e}");
        }
        if config.cloud.auto_enabled {
            let sync = Arc::clone(&cloud);
            tokio::spawn(async move { sync.run_loop().await });
        }
        Some(Arc::new(SaleLedger::new(
            db.clone(),
            cloud,
            &config.machine.id,
        )))
    };

    let orchestrator = Arc::new(DispenseOrchestrator::new(Arc::clone(&bus), ledger));
    let coordinator = Arc::new(TransactionCoordinator::new(pos, orchestrator));

    let state = AppState {
        coordinator,
        bus,
        db,
    };
    let listener = tokio::net::TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;
    tracing::info!("Listening on {}", config.http.bind);
    axum::serve(listener, http::router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}
