pub mod chats;
pub mod collaboration;
pub mod ideas;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod projects;
pub mod store;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Type alias for the shared database connection.
/// rusqlite is synchronous, so it is wrapped in Arc<Mutex> and every
/// operation runs inside tokio::task::spawn_blocking.
pub type DbPool = Arc<Mutex<Connection>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("chat {0} not found")]
    ChatNotFound(Uuid),
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the storage collaborator. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Create the data directory if needed, open (or create) the database file,
    /// enable WAL mode, and run migrations.
    pub fn open(data_dir: &str) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = Path::new(data_dir).join("ideaforge.db");
        let mut conn = Connection::open(&db_path)?;
        // WAL for concurrent readers
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(&mut conn)?;

        tracing::info!("Database initialized at {}", db_path.display());
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, used by tests and tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        Self::prepare(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    pub(crate) fn prepare(conn: &mut Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrations().to_latest(conn)?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            pool: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a closure against the connection on the blocking pool.
    pub async fn run<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.lock().map_err(|_| E::from(StoreError::Poisoned))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| E::from(StoreError::Join(e)))?
    }

    /// Run a closure inside one transaction; any error rolls everything back.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        self.run(move |conn| {
            let tx = conn.transaction().map_err(|e| E::from(StoreError::from(e)))?;
            let value = f(&tx)?;
            tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
            Ok(value)
        })
        .await
    }
}
