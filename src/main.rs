//! finance_ledger - recurring transaction batch runner
//!
//! Single-shot binary meant to be triggered by an external scheduler (cron).
//! Connects, applies the schema, wires the balance projection onto the event
//! bus and materializes today's due recurring transactions.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finance_ledger::db;
use finance_ledger::jobs::RecurringTransactionProcessor;
use finance_ledger::projection::BalanceProjection;
use finance_ledger::repository::{PgAccountRepository, PgTransactionRepository};
use finance_ledger::{Config, EventBus};

/// Initialize tracing/logging; JSON lines in production
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "finance_ledger=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(environment = %config.environment, "Starting recurring transaction batch");

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;
    db::verify_connection(&pool).await?;
    db::run_migrations(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    let event_bus = Arc::new(EventBus::new());
    event_bus.set_error_callback(|event_kind, handler, error| {
        tracing::error!(
            event_kind = %event_kind,
            handler = %handler,
            error = %format!("{:#}", error),
            "Event handler gave up after retries"
        );
    });
    Arc::new(BalanceProjection::new(Arc::new(PgAccountRepository::new(pool.clone()))))
        .register(&event_bus, Some(config.retry_config()));

    let processor = RecurringTransactionProcessor::new(
        Arc::new(PgTransactionRepository::new(pool.clone())),
        Arc::clone(&event_bus),
    );

    let outcome = tokio::select! {
        report = processor.run_for_today() => Some(report),
        _ = shutdown_signal() => None,
    };

    pool.close().await;

    match outcome {
        Some(report) => {
            let report = report?;
            tracing::info!(
                created = report.created,
                skipped = report.skipped,
                failed = report.failed,
                "Recurring batch complete"
            );
            if report.failed > 0 {
                return Err(anyhow::anyhow!("{} recurring template(s) failed", report.failed));
            }
            Ok(())
        }
        None => {
            tracing::warn!("Batch interrupted; unprocessed templates are picked up on the next run");
            Ok(())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping batch");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping batch");
        },
    }
}
