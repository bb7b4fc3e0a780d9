//! Postgres pool and schema setup.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const MAX_CONNECTIONS: u32 = 10;

/// How long a ledger operation waits for a connection. Exceeding it yields
/// `sqlx::Error::PoolTimedOut`, which the retry policy treats as transient.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Applies `migrations/` (orders, profiles, device grants, redeem codes,
/// credit events, system config).
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
