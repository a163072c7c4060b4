use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref BOOKINGS_COUNTER: CounterVec = register_counter_vec!(
        "api_bookings_created_total",
        "Bookings created",
        &["source"]
    ).unwrap();

    pub static ref DOCUMENT_UPLOADS_COUNTER: CounterVec = register_counter_vec!(
        "api_document_uploads_total",
        "Document uploads by outcome",
        &["status"]
    ).unwrap();

    pub static ref PAYMENTS_COUNTER: CounterVec = register_counter_vec!(
        "api_payments_total",
        "Payment events by resulting status",
        &["status"]
    ).unwrap();

    pub static ref REPORTS_COUNTER: CounterVec = register_counter_vec!(
        "api_reports_generated_total",
        "Spreadsheet reports generated by type",
        &["type"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref BOOKINGS_GAUGE: GaugeVec = register_gauge_vec!(
        "funeral_bookings_by_status",
        "Bookings by status",
        &["status"]
    ).unwrap();

    pub static ref PENDING_DOCUMENTS_GAUGE: Gauge = register_gauge!(
        "funeral_documents_pending_review",
        "Documents awaiting review"
    ).unwrap();

    pub static ref IN_STORAGE_GAUGE: Gauge = register_gauge!(
        "funeral_deceased_in_storage",
        "Deceased records not yet released"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let by_status: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*)::BIGINT FROM bookings GROUP BY status")
            .fetch_all(pool)
            .await?;

    BOOKINGS_GAUGE.reset();
    for (status, count) in &by_status {
        BOOKINGS_GAUGE.with_label_values(&[status.as_str()]).set(*count as f64);
    }

    let pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM documents WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;
    PENDING_DOCUMENTS_GAUGE.set(pending as f64);

    let in_storage: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM deceased WHERE release_status = 'in_storage'",
    )
    .fetch_one(pool)
    .await?;
    IN_STORAGE_GAUGE.set(in_storage as f64);

    info!("Metrics: collected {} booking status bucket(s)", by_status.len());
    Ok(())
}
