use crate::SqliteConfigSerde;
use log::debug;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use std::{future::Future, sync::Arc, time::Duration as StdDuration};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub enum JournalMode {
    WAL,      // Best for concurrent access
    DELETE,   // Default, good for single writer
    TRUNCATE, // Faster than DELETE
    MEMORY,   // In-memory journal
}

#[derive(Debug, Clone)]
pub enum SynchronousMode {
    OFF,
    NORMAL,
    FULL,
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub read_only: bool,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
}

impl SqliteConfig {
    pub fn read_only(&self) -> Self {
        Self {
            read_only: true,
            synchronous: SynchronousMode::OFF, // No writes, so sync doesn't matter
            ..self.clone()
        }
    }

    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let mut options = SqliteConnectOptions::new()
            .filename(database_path)
            .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));

        if self.read_only {
            // Pragmas that write to the file can't be applied on a read only handle
            return options.read_only(true);
        }

        options = options.read_only(false).create_if_missing(true);

        let journal_mode = match self.journal_mode {
            JournalMode::WAL => "WAL",
            JournalMode::DELETE => "DELETE",
            JournalMode::TRUNCATE => "TRUNCATE",
            JournalMode::MEMORY => "MEMORY",
        };
        options = options.pragma("journal_mode", journal_mode);

        let sync_mode = match self.synchronous {
            SynchronousMode::OFF => "OFF",
            SynchronousMode::NORMAL => "NORMAL",
            SynchronousMode::FULL => "FULL",
        };
        options
            .pragma("synchronous", sync_mode)
            .pragma("cache_size", self.cache_size.to_string())
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::WAL,
            synchronous: SynchronousMode::NORMAL,
            cache_size: 10000,
        }
    }
}

impl From<SqliteConfigSerde> for SqliteConfig {
    fn from(config: SqliteConfigSerde) -> Self {
        Self {
            read_only: false,
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: match config.journal_mode.to_uppercase().as_str() {
                "WAL" => JournalMode::WAL,
                "DELETE" => JournalMode::DELETE,
                "TRUNCATE" => JournalMode::TRUNCATE,
                "MEMORY" => JournalMode::MEMORY,
                _ => JournalMode::WAL,
            },
            synchronous: match config.synchronous.to_uppercase().as_str() {
                "OFF" => SynchronousMode::OFF,
                "NORMAL" => SynchronousMode::NORMAL,
                "FULL" => SynchronousMode::FULL,
                _ => SynchronousMode::NORMAL,
            },
            cache_size: config.cache_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            read_max_connections: 4,
            read_min_connections: 1,
            write_max_connections: 2,
            write_min_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            sqlite_config: SqliteConfig::default(),
        }
    }
}

impl From<crate::config::DBSettings> for DatabasePoolConfig {
    fn from(config: crate::config::DBSettings) -> Self {
        Self {
            read_max_connections: config.read_max_connections,
            read_min_connections: config.read_min_connections,
            write_max_connections: config.write_max_connections,
            write_min_connections: config.write_min_connections,
            idle_timeout_secs: config.idle_timeout_secs,
            acquire_timeout_secs: config.acquire_timeout_secs,
            sqlite_config: config.sqlite_config.into(),
        }
    }
}

static SNAPSHOTS_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/snapshots");

#[derive(Error, Debug)]
pub enum DatabaseWriteError {
    #[error("problem writing to db: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("timed out after {0:?} waiting for the write lock")]
    Timeout(StdDuration),
}

/// Separate read and write pools onto one SQLite file. Writes are funneled
/// through `execute_write` so only one runs at a time.
#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_name: String,
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    write_timeout: StdDuration,
}

impl DBConnection {
    pub async fn new(
        path: &str,
        db_name: &str,
        database_pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", path, db_name);

        let database_url = format!("sqlite:{}", database_path);
        if !Sqlite::database_exists(&database_url).await? {
            Sqlite::create_database(&database_url).await?;
        }

        let (read_pool, write_pool) =
            Self::create_pools(&database_path, &database_pool_config).await?;

        SNAPSHOTS_MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_name: db_name.to_string(),
            database_path,
            read_pool,
            write_pool,
            write_lock: Arc::new(Mutex::new(())),
            write_timeout: StdDuration::from_secs(database_pool_config.acquire_timeout_secs),
        })
    }

    /// Wraps already migrated pools, used by tests running on `sqlx::test` pools
    pub fn new_with_pools(
        database_name: String,
        database_path: String,
        read_pool: SqlitePool,
        write_pool: SqlitePool,
    ) -> Self {
        Self {
            database_name,
            database_path,
            read_pool,
            write_pool,
            write_lock: Arc::new(Mutex::new(())),
            write_timeout: StdDuration::from_secs(5),
        }
    }

    async fn create_pools(
        database_path: &str,
        database_pool_config: &DatabasePoolConfig,
    ) -> Result<(SqlitePool, SqlitePool), sqlx::Error> {
        let write_config = database_pool_config.sqlite_config.clone();
        let read_config = write_config.read_only();

        let write_connection = write_config.build_connect_options(database_path);
        debug!("Write connection: {:?}", write_connection);

        // Write pool first, it creates the file and sets the journal mode
        let write_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.write_max_connections)
            .min_connections(database_pool_config.write_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(write_connection)
            .await?;

        let read_connection = read_config.build_connect_options(database_path);
        debug!("Read connection: {:?}", read_connection);

        let read_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.read_max_connections)
            .min_connections(database_pool_config.read_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(read_connection)
            .await?;

        Ok((read_pool, write_pool))
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub async fn close(self) {
        self.read_pool.close().await;
        self.write_pool.close().await;
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    pub async fn execute_write<F, Fut, T>(&self, operation: F) -> Result<T, DatabaseWriteError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let _guard = tokio::time::timeout(self.write_timeout, self.write_lock.lock())
            .await
            .map_err(|_| DatabaseWriteError::Timeout(self.write_timeout))?;

        operation(self.write_pool.clone())
            .await
            .map_err(DatabaseWriteError::Sqlx)
    }
}
