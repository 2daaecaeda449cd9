use anyhow::{bail, Context};
use clap::Parser;
use ecologistix::cli::{self, Cli, Commands};
use ecologistix::config::{AppConfig, LoggingConfig, QueueBackendKind};
use ecologistix::coordination::{install_signal_handlers, GracefulShutdown};
use ecologistix::coordinator::{
    Blackboard, CoordinationLoop, DelegationEmitter, EventRouter, HandlerContext, LoopMetrics,
};
use ecologistix::persistence::{PostgresShipmentStore, ShipmentStore};
use ecologistix::queue::{MemoryQueue, PostgresQueue, PriorityQueueClient, QueueBackend};
use ecologistix::services::{StatusServer, StatusState};
use sqlx::postgres::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config).context("failed to load configuration")?;
    if let Err(errors) = config.validate() {
        bail!("invalid configuration: {}", errors.join("; "));
    }

    match &cli.command {
        None | Some(Commands::Run) => {
            init_logging(&config.logging);
            run_coordinator(config).await?;
        }
        Some(Commands::Publish { priority, payload }) => {
            init_logging_simple();
            let bytes = cli::load_payload(payload).context("failed to read payload")?;
            let (backend, _) = connect(&config).await?;
            if config.queue.backend == QueueBackendKind::Memory {
                warn!("publishing to the in-memory backend; the event is lost on exit");
            }
            cli::publish(&PriorityQueueClient::new(backend), *priority, &bytes)
                .await
                .context("failed to publish event")?;
        }
        Some(Commands::Migrate) => {
            init_logging(&config.logging);
            let Some(pool) = connect_pool(&config).await? else {
                bail!("migrate needs database.url");
            };
            PostgresQueue::from_pool(pool)
                .migrate()
                .await
                .context("migration failed")?;
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info,ecologistix=debug,sqlx=warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Pool for the Postgres queue and/or shipment store, when either is enabled
async fn connect_pool(config: &AppConfig) -> anyhow::Result<Option<PgPool>> {
    let needed = config.queue.backend == QueueBackendKind::Postgres
        || config.database.persist_shipments
        || !config.database.url.trim().is_empty();
    if !needed {
        return Ok(None);
    }

    let queue = PostgresQueue::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    Ok(Some(queue.pool().clone()))
}

async fn connect(config: &AppConfig) -> anyhow::Result<(Arc<dyn QueueBackend>, Option<PgPool>)> {
    let pool = match config.queue.backend {
        QueueBackendKind::Postgres => connect_pool(config).await?,
        QueueBackendKind::Memory if config.database.persist_shipments => connect_pool(config).await?,
        QueueBackendKind::Memory => None,
    };

    let backend: Arc<dyn QueueBackend> = match (config.queue.backend, &pool) {
        (QueueBackendKind::Postgres, Some(pool)) => {
            let queue = PostgresQueue::from_pool(pool.clone());
            queue.migrate().await.context("migration failed")?;
            Arc::new(queue)
        }
        (QueueBackendKind::Postgres, None) => bail!("postgres backend needs database.url"),
        (QueueBackendKind::Memory, _) => Arc::new(MemoryQueue::new()),
    };

    backend
        .ping()
        .await
        .context("queue backend unreachable at startup")?;
    info!(backend = backend.name(), "queue backend ready");

    Ok((backend, pool))
}

async fn run_coordinator(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting ecologistix coordinator");

    let (backend, pool) = connect(&config).await?;
    let queue = PriorityQueueClient::new(backend);

    let shutdown = Arc::new(GracefulShutdown::with_defaults());
    install_signal_handlers(shutdown.clone());

    let blackboard = Arc::new(Blackboard::new());
    let store: Option<Arc<dyn ShipmentStore>> = match (&pool, config.database.persist_shipments) {
        (Some(pool), true) => {
            let store = PostgresShipmentStore::new(pool.clone());
            if config.queue.backend == QueueBackendKind::Memory {
                PostgresQueue::from_pool(pool.clone())
                    .migrate()
                    .await
                    .context("migration failed")?;
            }
            let persisted = store
                .load_all()
                .await
                .context("failed to load persisted shipment state")?;
            let hydrated = blackboard.hydrate(persisted);
            info!(hydrated, "blackboard hydrated from shipment store");
            Some(Arc::new(store))
        }
        _ => None,
    };

    let emitter = DelegationEmitter::new(queue.clone()).with_shutdown(shutdown.token());
    let router = EventRouter::with_default_handlers(HandlerContext::new(blackboard.clone(), emitter));
    let metrics = Arc::new(LoopMetrics::new());

    let mut coordination = CoordinationLoop::new(config.coordinator.clone(), queue.clone(), router)
        .with_metrics(metrics.clone());
    if let Some(store) = store {
        coordination = coordination.with_store(store);
    }

    let status_handle = config.status.port.map(|port| {
        let state = Arc::new(StatusState::new(blackboard.clone(), metrics.clone(), queue.clone()));
        let token = shutdown.token();
        tokio::spawn(async move {
            if let Err(e) = StatusServer::new(state, port).run(token).await {
                error!("Status server error: {}", e);
            }
        })
    });

    let loop_handle = tokio::spawn(coordination.run(shutdown.token()));

    let signal = shutdown.token().cancelled().await;
    let grace = shutdown.grace_period(signal);
    info!(%signal, grace_secs = grace.as_secs(), "waiting for tasks to stop");

    if tokio::time::timeout(grace, loop_handle).await.is_err() {
        warn!("coordination loop did not stop within the grace period");
    }
    if let Some(handle) = status_handle {
        if tokio::time::timeout(grace, handle).await.is_err() {
            warn!("status server did not stop within the grace period");
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        processed = snapshot.events_processed,
        dropped = snapshot.events_dropped,
        delegated = snapshot.tasks_delegated,
        "coordinator stopped"
    );
    Ok(())
}
