/*!
 * Shared SQLite connection for the chapter store.
 *
 * rusqlite connections are blocking, so async callers go through
 * `execute_async` and `transaction_async`, which hop onto tokio's blocking
 * pool and hold the connection lock only there.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

/// Path reported for in-memory databases
const IN_MEMORY: &str = ":memory:";

/// Cloneable handle to one SQLite connection
#[derive(Clone)]
pub struct DatabaseConnection {
    db_path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl DatabaseConnection {
    /// Open or create the database file at `db_path`, creating missing directories.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        info!("Opening chapter store at {}", db_path.display());
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        Self::prepare(conn, db_path)
    }

    /// Private database living as long as the handle; used by tests.
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory chapter store");
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;

        Self::prepare(conn, PathBuf::from(IN_MEMORY))
    }

    fn prepare(conn: Connection, db_path: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;

        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY
    }

    /// Run `f` on the connection from synchronous code.
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection.lock();
        f(&conn)
    }

    /// Run `f` on the connection from the blocking pool.
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || {
            let conn = connection.lock();
            f(&conn)
        })
        .await
        .context("Database task panicked")?
    }

    /// Run `f` inside a transaction on the blocking pool.
    ///
    /// The transaction commits when `f` succeeds and rolls back otherwise.
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || {
            let mut conn = connection.lock();
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit().context("Failed to commit transaction")?;
            Ok(value)
        })
        .await
        .context("Database transaction task panicked")?
    }

    /// Row counts and file size
    pub fn stats(&self) -> Result<DatabaseStats> {
        let (chapter_count, paragraph_count, translated_chapters) = self.execute(|conn| {
            let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };
            Ok((
                count("SELECT COUNT(*) FROM chapters")?,
                count("SELECT COUNT(*) FROM paragraphs")?,
                count("SELECT COUNT(*) FROM chapters WHERE status = 'translated'")?,
            ))
        })?;

        let file_size_bytes = if self.is_in_memory() {
            0
        } else {
            std::fs::metadata(&self.db_path).map_or(0, |m| m.len())
        };

        Ok(DatabaseStats {
            chapter_count,
            paragraph_count,
            translated_chapters,
            file_size_bytes,
        })
    }
}

/// Chapter store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of stored chapters
    pub chapter_count: i64,
    /// Number of stored paragraphs across all chapters
    pub paragraph_count: i64,
    /// Chapters whose last run finished
    pub translated_chapters: i64,
    /// Size of the main database file
    pub file_size_bytes: u64,
}

impl fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chapters: {} ({} translated), Paragraphs: {}, Size: {} KB",
            self.chapter_count,
            self.translated_chapters,
            self.paragraph_count,
            self.file_size_bytes / 1024
        )
    }
}
