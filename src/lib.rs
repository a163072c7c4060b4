// Library exports for the API binary, the admin CLI and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use services::{
    activity::ActivityLogger,
    mpesa::MpesaClient,
    payment_provider::{PaymentProvider, SimulatedMobileMoney},
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub activity: ActivityLogger,
    pub payments: Arc<dyn PaymentProvider>,
    pub mpesa: Option<Arc<MpesaClient>>,
}

impl AppState {
    /// Production wiring: Postgres activity sink, simulated mobile money,
    /// and the gateway client when it is configured.
    pub fn new(db: PgPool, config: Config) -> Self {
        let mpesa = MpesaClient::new(&config).map(Arc::new);
        Self {
            activity: ActivityLogger::postgres(db.clone()),
            payments: Arc::new(SimulatedMobileMoney),
            mpesa,
            config: Arc::new(config),
            db,
        }
    }
}
