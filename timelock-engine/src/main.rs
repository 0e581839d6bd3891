use std::sync::Arc;

use anyhow::Context;
use timelock_core::config::CoreConfig;
use timelock_engine::{
    BroadcastNotifier, ExecutionLedger, ExecutionProcessor, FanoutNotifier, InMemoryLedger,
    PostgresLedger, RelayerExecutor, SchedulerApiBuilder, SchedulerConfig, TracingNotifier,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    if let Err(err) = timelock_core::logging::init_tracing(None) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let core = CoreConfig::from_env().context("failed to load core configuration")?;
    let config =
        SchedulerConfig::from_env(&core).context("failed to load scheduler configuration")?;

    let ledger: Arc<dyn ExecutionLedger> = match core.database_url() {
        Some(_) => Arc::new(
            PostgresLedger::from_config(&core)
                .await
                .context("failed to open execution ledger")?,
        ),
        None => {
            if core.is_production() {
                warn!("no database configured; execution ledger is in-memory and not durable");
            }
            Arc::new(InMemoryLedger::new())
        }
    };

    let executor = RelayerExecutor::new(
        config.executor_url().context("executor endpoint missing")?,
        config.executor_timeout(),
    )
    .context("failed to build relayer client")?;

    let events = BroadcastNotifier::new(config.event_buffer);
    let notifier = FanoutNotifier::new()
        .with(Arc::new(TracingNotifier))
        .with(Arc::new(events.clone()));

    let processor = ExecutionProcessor::builder(ledger, Arc::new(executor))
        .policy(config.retry_policy())
        .notifier(Arc::new(notifier))
        .build();

    info!(
        node = %core.node_name,
        retry_strategy = %config.retry_strategy,
        max_attempts = config.max_attempts,
        tick_interval_secs = config.tick_interval_secs,
        "timelock scheduler configured"
    );

    let service = SchedulerApiBuilder::new(Arc::new(processor), events)
        .serve(&config)
        .await
        .context("failed to start scheduler service")?;
    info!(address = %service.local_addr, "timelock scheduler listening");

    shutdown_signal().await;
    info!("shutdown requested");
    service.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
