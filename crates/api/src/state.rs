//! Application state

use jsonwebtoken::DecodingKey;
use sqlx::PgPool;
use std::sync::Arc;

use souq_ledger::{ConsistencyMode, LedgerService};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub decoding_key: DecodingKey,
    pub ledger: Arc<LedgerService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let mode = ConsistencyMode::from_config(config.atomic_ledger_writes);
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let ledger = Arc::new(LedgerService::new(pool.clone(), mode));

        Self {
            pool,
            config,
            decoding_key,
            ledger,
        }
    }
}
