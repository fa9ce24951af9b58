use std::time::Duration;

use heatwatch_core::config::PostgresConfig;
use heatwatch_core::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::db_error;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the PostgreSQL connection pool.
///
/// Schema management lives outside this service; no migrations are run.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    if !config.is_configured() {
        warn!("PG_USERNAME not set, connecting as the default postgres user");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.connection_string())
        .await
        .map_err(db_error)?;

    info!(
        host = %config.host,
        database = %config.database,
        max_connections = config.max_connections,
        "PostgreSQL connected"
    );
    Ok(pool)
}
