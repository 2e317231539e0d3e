//! SQLite helpers: build the connection pool and run sqlx migrations
//!
//! Migrations live in `migrations/` at the crate root and are embedded with
//! `sqlx::migrate!()`.

use anyhow::{Context, Result};
use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// Create a SQLite pool and apply any pending migrations
pub async fn create_sqlite_pool_with_migration(db_url: &str) -> Result<Pool<Sqlite>> {
    // every connection to an in-memory database is a separate database
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("failed to open SQLite database {}", db_url))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run schema migrations")?;

    info!("[DB] schema ready at {}", db_url);
    Ok(pool)
}

/// Wrap the sqlx pool in a sea-orm connection for the read-side query surface
pub fn sea_orm_connection(pool: &Pool<Sqlite>) -> DatabaseConnection {
    SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> Pool<Sqlite> {
    create_sqlite_pool_with_migration("sqlite::memory:")
        .await
        .expect("in-memory database")
}
