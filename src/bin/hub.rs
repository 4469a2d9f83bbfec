use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleet_inspector::{
    config::{StorageConfig, read_config_file},
    inspection::build_scheduler,
    storage::{StorageBackend, memory::MemoryBackend, retention::spawn_retention_task, seed_inventory},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Fleet health inspection hub")]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log level (trace, debug, info, warn, error); overrides INSPECTOR_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Run a single inspection cycle and exit
    #[arg(long)]
    once: bool,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_inspector", level),
        ("inspector_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn log_level(args: &Args) -> LevelFilter {
    args.log_level
        .clone()
        .or_else(|| std::env::var("INSPECTOR_LOG").ok())
        .and_then(|level| LevelFilter::from_str(&level).ok())
        .unwrap_or(LevelFilter::INFO)
}

async fn open_storage(config: StorageConfig) -> anyhow::Result<(Arc<dyn StorageBackend>, Option<u32>)> {
    match config {
        StorageConfig::None => {
            warn!("no persistent storage configured, inspections are kept in memory only");
            Ok((Arc::new(MemoryBackend::new()), None))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite {
            path,
            retention_days,
        } => {
            let backend = fleet_inspector::storage::sqlite::SqliteBackend::new(&path)
                .await
                .with_context(|| format!("failed to open database at {}", path.display()))?;
            Ok((Arc::new(backend), Some(retention_days)))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage configured but the storage-sqlite feature is disabled")
        }
    }
}

#[cfg(feature = "api")]
async fn serve_api(
    settings: &fleet_inspector::config::ApiSettings,
    storage: Arc<dyn StorageBackend>,
    scheduler: Arc<fleet_inspector::inspection::Scheduler>,
) -> anyhow::Result<()> {
    use fleet_inspector::api::{ApiConfig, ApiState, spawn_api_server};

    let api_config = ApiConfig::try_from(settings)?;
    let addr = spawn_api_server(api_config, ApiState::new(storage, scheduler)).await?;
    info!("administrative API available at http://{addr}/api/v1");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(log_level(&args));
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let (storage, retention_days) = open_storage(config.storage.clone().unwrap_or_default()).await?;

    let seeded = seed_inventory(storage.as_ref(), config.node_specs())
        .await
        .context("failed to seed fleet inventory")?;
    info!("fleet inventory: {seeded} configured node(s)");

    let scheduler = Arc::new(build_scheduler(&config, storage.clone())?);

    if args.once {
        let summary = scheduler.run_once().await?;
        info!(
            "single cycle finished: {}/{} succeeded",
            summary.succeeded, summary.total
        );
        storage.close().await?;
        return Ok(());
    }

    // bind the API first so a taken port fails before any cycle runs
    if let Some(settings) = &config.api {
        #[cfg(feature = "api")]
        let served = serve_api(settings, storage.clone(), scheduler.clone()).await;
        #[cfg(not(feature = "api"))]
        let served: anyhow::Result<()> = {
            warn!(bind = %settings.bind, "api section ignored, built without the api feature");
            Ok(())
        };

        if let Err(e) = served {
            storage.close().await?;
            return Err(e);
        }
    }

    let retention = retention_days.map(|days| spawn_retention_task(storage.clone(), days));

    scheduler.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    scheduler.stop().await;
    if let Some(handle) = retention {
        handle.abort();
    }
    storage.close().await?;

    Ok(())
}
