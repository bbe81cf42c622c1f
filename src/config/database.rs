use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::{ConfigError, Settings};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} database pool has been shut down")]
    Closed(&'static str),
}

/// A lazily connected Postgres pool shared by every request.
///
/// The pool is created on first use and reused afterwards. After `shutdown`
/// the resource refuses further acquisitions, whether or not a pool was ever
/// created.
pub struct PgResource {
    label: &'static str,
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
    pool: OnceCell<PgPool>,
    closed: AtomicBool,
}

impl PgResource {
    pub fn new(
        label: &'static str,
        url: impl Into<String>,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ConfigError::Missing(label));
        }

        Ok(Self {
            label,
            url,
            max_connections,
            acquire_timeout,
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn master(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(
            "MASTER_DATABASE_URL",
            settings.master_database_url.clone(),
            settings.max_connections,
            settings.acquire_timeout(),
        )
    }

    pub fn auth(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(
            "DATABASE_URL",
            settings.database_url.clone(),
            settings.max_connections,
            settings.acquire_timeout(),
        )
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn pool(&self) -> Result<&PgPool, StorageError> {
        if self.is_closed() {
            return Err(StorageError::Closed(self.label));
        }

        let pool = self
            .pool
            .get_or_try_init(|| async {
                tracing::info!(
                    database = self.label,
                    max_connections = self.max_connections,
                    "initializing connection pool"
                );
                PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.acquire_timeout)
                    .connect(&self.url)
                    .await
            })
            .await?;

        if pool.is_closed() {
            return Err(StorageError::Closed(self.label));
        }
        Ok(pool)
    }

    /// Checks out one connection. It goes back to the pool when dropped.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, StorageError> {
        let pool = self.pool().await?;
        Ok(pool.acquire().await?)
    }

    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(pool) = self.pool.get() {
            tracing::info!(database = self.label, "closing connection pool");
            pool.close().await;
        }
    }
}
