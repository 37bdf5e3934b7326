use crate::config::{AppConfig, TransactionMode};
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, TransactionTrait};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns a `DbErr` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!(
        max_connections = config.max_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("storefront_db.max_connections", config.max_connections as f64);

    let pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection establishment failed: {}", e);
        counter!("storefront_db.connection_failures", 1);
        e
    })?;

    info!("Database connection pool established successfully");
    Ok(pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs all pending migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None).await;

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!("Database migrations completed successfully in {:?}", elapsed),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    let result = pool.ping().await;
    if let Err(e) = &result {
        error!("Database connection check failed: {}", e);
        counter!("storefront_db.connection_failures", 1);
    }
    result
}

/// Whether the order commit runs inside a real database transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionSupport {
    Transactional,
    Degraded,
}

impl TransactionSupport {
    /// Decides the commit mode once at startup.
    ///
    /// `auto` opens and rolls back a throwaway transaction; failure downgrades to the
    /// sequential path. `required` turns that failure into a startup error.
    pub async fn detect(pool: &DbPool, mode: TransactionMode) -> Result<Self, DbErr> {
        if mode == TransactionMode::Degraded {
            warn!("Transaction mode forced to degraded; order commits are not atomic");
            return Ok(Self::Degraded);
        }

        let outcome = match pool.begin().await {
            Ok(txn) => txn.rollback().await,
            Err(e) => Err(e),
        };

        match (outcome, mode) {
            (Ok(()), _) => {
                info!("Database supports transactions; order commits are atomic");
                Ok(Self::Transactional)
            }
            (Err(e), TransactionMode::Required) => {
                error!("Transactions required but unavailable: {}", e);
                Err(e)
            }
            (Err(e), _) => {
                warn!(
                    "Transactions unavailable ({}); running order commits in degraded mode",
                    e
                );
                Ok(Self::Degraded)
            }
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transactional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_pool() -> Result<DbPool, DbErr> {
        establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_check_connection() {
        let pool = setup_test_pool().await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = setup_test_pool().await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn detects_sqlite_transactions() {
        let pool = setup_test_pool().await.unwrap();
        let support = TransactionSupport::detect(&pool, TransactionMode::Auto)
            .await
            .unwrap();
        assert_eq!(support, TransactionSupport::Transactional);
    }

    #[tokio::test]
    async fn honours_forced_degraded_mode() {
        let pool = setup_test_pool().await.unwrap();
        let support = TransactionSupport::detect(&pool, TransactionMode::Degraded)
            .await
            .unwrap();
        assert_eq!(support, TransactionSupport::Degraded);
    }
}
