use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};

use super::error::{QueryContext, StoreError};
use super::{MIGRATION_001_INITIAL, OperationStore, UserStore, WalletStore};

/// Handle to the backing store. Cheap to clone; every clone shares one pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Wrap an existing SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        info!(url = database_url, "database connection pool established");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database file at the given path (create if missing + migrate).
    pub async fn init(database_path: &str) -> Result<Self, StoreError> {
        let db = Self::connect(&format!("sqlite:{}?mode=rwc", database_path)).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Open an existing database file.
    pub async fn open(database_path: &str) -> Result<Self, StoreError> {
        Self::connect(&format!("sqlite:{}", database_path)).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check out a pooled connection for work outside any unit of work.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire connection")
    }

    /// Start a unit of work on a dedicated connection.
    pub async fn begin(&self, options: TxOptions) -> Result<UnitOfWork, sqlx::Error> {
        UnitOfWork::begin(&self.pool, options).await
    }
}

/// Options for starting a unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxOptions {
    /// Give up if no connection is available within this time.
    pub begin_timeout: Option<Duration>,
}

impl TxOptions {
    pub fn with_begin_timeout(mut self, timeout: Duration) -> Self {
        self.begin_timeout = Some(timeout);
        self
    }
}

/// A transaction bound to one connection for its whole lifetime.
///
/// `commit` and `rollback` consume the handle, so a unit of work has exactly one
/// outcome. Dropping it without either rolls back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    async fn begin(pool: &SqlitePool, options: TxOptions) -> Result<Self, sqlx::Error> {
        let tx = match options.begin_timeout {
            Some(limit) => tokio::time::timeout(limit, pool.begin())
                .await
                .map_err(|_| sqlx::Error::PoolTimedOut)??,
            None => pool.begin().await?,
        };
        debug!("unit of work started");
        Ok(Self { tx })
    }

    /// The transaction's connection. Anything run on it is part of this unit.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub fn users(&mut self) -> UserStore<'_> {
        UserStore::new(&mut self.tx)
    }

    pub fn wallets(&mut self) -> WalletStore<'_> {
        WalletStore::new(&mut self.tx)
    }

    pub fn operations(&mut self) -> OperationStore<'_> {
        OperationStore::new(&mut self.tx)
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await?;
        debug!("unit of work committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await?;
        debug!("unit of work rolled back");
        Ok(())
    }
}
