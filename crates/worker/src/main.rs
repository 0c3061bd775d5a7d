//! Souq Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription expiry sweep (hourly)
//! - Ledger invariant checks (daily at 3:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use souq_ledger::{ConsistencyMode, LedgerService};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Souq Worker");

    let pool = create_db_pool().await?;

    let atomic_writes = std::env::var("LEDGER_ATOMIC_WRITES")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);
    let ledger = Arc::new(LedgerService::new(
        pool.clone(),
        ConsistencyMode::from_config(atomic_writes),
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription expiry sweep (hourly)
    // Moves expired paid subscriptions to past_due with a grace window, and
    // past_due subscriptions whose grace window has elapsed to expired.
    let sweep_ledger = ledger.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let ledger = sweep_ledger.clone();
            Box::pin(async move {
                info!("Running subscription expiry sweep");
                match ledger.subscriptions.sweep_expired().await {
                    Ok(summary) => info!(
                        marked_past_due = summary.marked_past_due,
                        marked_expired = summary.marked_expired,
                        "Subscription expiry sweep complete"
                    ),
                    Err(e) => error!(error = %e, "Subscription expiry sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription expiry sweep (hourly)");

    // Job 2: Ledger invariant checks (daily at 3:00 AM UTC)
    let invariant_ledger = ledger.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let ledger = invariant_ledger.clone();
            Box::pin(async move {
                info!("Running ledger invariant checks");
                match ledger.invariants.run_all_checks().await {
                    Ok(summary) => {
                        if summary.healthy {
                            info!(
                                checks_run = summary.checks_run,
                                "All ledger invariants hold"
                            );
                        } else {
                            for violation in &summary.violations {
                                warn!(
                                    invariant = %violation.invariant,
                                    severity = %violation.severity,
                                    account_ids = ?violation.account_ids,
                                    description = %violation.description,
                                    "Ledger invariant violated"
                                );
                            }
                            error!(
                                checks_failed = summary.checks_failed,
                                violations = summary.violations.len(),
                                "Ledger invariant check found violations"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Ledger invariant check failed to run"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Ledger invariant checks (daily at 3:00 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Souq Worker started successfully with {} scheduled jobs", 3);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
