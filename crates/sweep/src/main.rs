//! Trading Journal pending-order sweep
//!
//! One-shot maintenance command: re-polls every PENDING Snap order against
//! the provider and reconciles it through the same path as the status poll
//! endpoint. A failure on one order is logged and does not stop the sweep.

use std::sync::Arc;

use journal_billing::{BillingConfig, BillingService, PgBillingStore, SweepReport};
use journal_shared::create_pool;
use tracing::{info, warn};

fn log_report(report: &SweepReport) {
    info!(
        checked = report.checked,
        updated = report.updated,
        failed = report.failed,
        "Pending sweep complete"
    );
    if report.failed > 0 {
        warn!(failed = report.failed, "Some pending orders could not be reconciled");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,journal_billing=debug")),
        )
        .init();

    info!("Starting Trading Journal pending sweep");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let config = BillingConfig::from_env();
    if !config.midtrans.is_configured() {
        warn!("MIDTRANS_SERVER_KEY not set - status fetches will fail");
    }

    let pool = create_pool(&database_url).await?;
    info!("Database pool created");

    let billing = BillingService::new(Arc::new(PgBillingStore::new(pool.clone())), &config)?;
    let report = billing.sweep_pending_snap().await?;
    log_report(&report);

    pool.close().await;
    Ok(())
}
