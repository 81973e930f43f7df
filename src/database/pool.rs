use crate::config::DatabaseConfig;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Where the `players` schema lives unless told otherwise
pub const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolCreation(sqlx::Error),

    #[error("Database connection timeout")]
    ConnectionTimeout,

    #[error("Database migration failed: {0}")]
    Migration(#[from] MigrateError),
}

/// Open the player store pool. Fails fast if the server cannot answer a
/// trivial query, so a bad `DATABASE_URL` surfaces at startup.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .test_before_acquire(config.test_before_acquire)
        .connect(&config.url)
        .await
        .map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DatabaseError::ConnectionTimeout,
            other => DatabaseError::PoolCreation(other),
        })?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(DatabaseError::PoolCreation)?;

    debug!("Player store pool ready ({} max connections)", config.max_connections);
    Ok(pool)
}

fn migrations_dir(custom: Option<&str>) -> &Path {
    Path::new(custom.unwrap_or(DEFAULT_MIGRATIONS_DIR))
}

/// Apply pending schema migrations from `dir` (or `./migrations`)
pub async fn run_migrations(pool: &PgPool, dir: Option<&str>) -> Result<(), DatabaseError> {
    let dir = migrations_dir(dir);
    let migrator = Migrator::new(dir).await?;

    info!(
        "Applying {} migration(s) from {}",
        migrator.iter().count(),
        dir.display()
    );
    migrator.run(pool).await?;

    Ok(())
}
