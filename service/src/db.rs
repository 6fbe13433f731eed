use std::time::Duration;

use sqlx_core::{error::Error as SqlxError, query_scalar::query_scalar};
use sqlx_postgres::{PgPool, PgPoolOptions};
use tracing::{error, info};

use crate::config::DatabaseConfig;

/// Connect the shared database pool.
///
/// There is exactly one attempt: if Postgres is unreachable within the
/// configured acquire timeout the error is returned and startup stops, so no
/// route is ever registered against a pool that never connected.
///
/// # Errors
/// Returns the driver error if the connection string is invalid, the server
/// is unreachable, or the connectivity check fails.
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, SqlxError> {
    info!(
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout_secs,
        "Connecting to Postgres..."
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|err| {
            error!(error = %err, "Database connection failed");
            err
        })?;

    query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await?;
    info!("Connected to the database");
    Ok(pool)
}
