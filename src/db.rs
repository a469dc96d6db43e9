//! SQLite cache for message bodies and attachment bytes
//!
//! Everything stored here can be rebuilt from the remote service. Bodies
//! are read back per fetch or search and dropped afterwards, so a large
//! mailbox costs disk space rather than resident memory.

use crate::error::Result;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

type DbPool = Pool<SqliteConnectionManager>;
type DbConnection = PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the cache database.
///
/// Clones share one connection pool. A database opened with
/// [`CacheDb::temporary`] lives in a directory that is removed when the
/// last handle is dropped.
#[derive(Clone)]
pub struct CacheDb {
    pool: DbPool,
    path: PathBuf,
    _dir: Option<Arc<TempDir>>,
}

impl fmt::Debug for CacheDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// SQLite integers are signed; ids beyond `i64::MAX` never occur.
fn key(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

impl CacheDb {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the file cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        Self::build(path.to_path_buf(), None)
    }

    /// A fresh database in a private temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the directory cannot be created,
    /// otherwise as [`CacheDb::open`].
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("imap-facade-").tempdir()?;
        let path = dir.path().join("cache.db");
        Self::build(path, Some(Arc::new(dir)))
    }

    /// [`CacheDb::open`] when a path is configured, else
    /// [`CacheDb::temporary`].
    ///
    /// # Errors
    ///
    /// As the chosen constructor.
    pub fn open_or_temporary(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(Self::temporary, Self::open)
    }

    fn build(path: PathBuf, dir: Option<Arc<TempDir>>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA synchronous = NORMAL;")
        });
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;
        let db = Self {
            pool,
            path,
            _dir: dir,
        };
        db.initialize_schema()?;
        info!("Cache database at {}", db.path.display());
        Ok(db)
    }

    fn connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r"
            PRAGMA journal_mode = WAL;

            -- Message bodies; `store` separates the sessions sharing a file.
            CREATE TABLE IF NOT EXISTS bodies (
                store INTEGER NOT NULL,
                mailbox INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                body BLOB NOT NULL,
                PRIMARY KEY (store, mailbox, uid)
            );

            -- Attachment bytes by download location; immutable once fetched.
            CREATE TABLE IF NOT EXISTS attachments (
                href TEXT PRIMARY KEY,
                content BLOB NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn put_body(&self, store: u64, mailbox: u64, uid: u32, body: &[u8]) -> Result<()> {
        self.connection()?.execute(
            "INSERT OR REPLACE INTO bodies (store, mailbox, uid, body) VALUES (?1, ?2, ?3, ?4)",
            params![key(store), key(mailbox), i64::from(uid), body],
        )?;
        Ok(())
    }

    pub(crate) fn body(&self, store: u64, mailbox: u64, uid: u32) -> Result<Option<Vec<u8>>> {
        Ok(self
            .connection()?
            .query_row(
                "SELECT body FROM bodies WHERE store = ?1 AND mailbox = ?2 AND uid = ?3",
                params![key(store), key(mailbox), i64::from(uid)],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub(crate) fn delete_body(&self, store: u64, mailbox: u64, uid: u32) -> Result<()> {
        self.connection()?.execute(
            "DELETE FROM bodies WHERE store = ?1 AND mailbox = ?2 AND uid = ?3",
            params![key(store), key(mailbox), i64::from(uid)],
        )?;
        Ok(())
    }

    pub(crate) fn delete_mailbox(&self, store: u64, mailbox: u64) -> Result<()> {
        let removed = self.connection()?.execute(
            "DELETE FROM bodies WHERE store = ?1 AND mailbox = ?2",
            params![key(store), key(mailbox)],
        )?;
        debug!("Removed {removed} bodies of mailbox {mailbox}");
        Ok(())
    }

    pub(crate) fn delete_store(&self, store: u64) -> Result<()> {
        self.connection()?
            .execute("DELETE FROM bodies WHERE store = ?1", params![key(store)])?;
        Ok(())
    }

    pub(crate) fn count_bodies(&self, store: u64) -> Result<usize> {
        let count: i64 = self.connection()?.query_row(
            "SELECT COUNT(*) FROM bodies WHERE store = ?1",
            params![key(store)],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub(crate) fn put_attachment(&self, href: &str, content: &[u8]) -> Result<()> {
        self.connection()?.execute(
            "INSERT OR REPLACE INTO attachments (href, content) VALUES (?1, ?2)",
            params![href, content],
        )?;
        Ok(())
    }

    pub(crate) fn attachment(&self, href: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .connection()?
            .query_row(
                "SELECT content FROM attachments WHERE href = ?1",
                params![href],
                |row| row.get(0),
            )
            .optional()?)
    }
}
