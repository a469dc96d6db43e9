//! Out-of-line storage for message bodies
//!
//! Messages only carry metadata; their bytes live in the cache database
//! and are read back for the duration of a fetch or search.

use crate::db::CacheDb;
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

static NEXT_STORE: AtomicU64 = AtomicU64::new(0);

/// One session's bodies, keyed by (mailbox id, UID).
///
/// Several stores may share a database file; each keeps to its own rows
/// and deletes them when dropped.
#[derive(Debug)]
pub struct BodyStore {
    db: CacheDb,
    id: u64,
}

impl BodyStore {
    /// Claim a fresh store in `db`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if rows left behind by an earlier
    /// process with the same store id cannot be cleared.
    pub fn open(db: CacheDb) -> Result<Self> {
        let id = (u64::from(std::process::id()) << 32) | NEXT_STORE.fetch_add(1, Ordering::Relaxed);
        db.delete_store(id)?;
        Ok(Self { db, id })
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the row cannot be written.
    pub fn insert(&self, mailbox: u64, uid: u32, body: &[u8]) -> Result<()> {
        self.db.put_body(self.id, mailbox, uid, body)
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the database cannot be read.
    pub fn get(&self, mailbox: u64, uid: u32) -> Result<Option<Vec<u8>>> {
        self.db.body(self.id, mailbox, uid)
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the row cannot be deleted.
    pub fn remove(&self, mailbox: u64, uid: u32) -> Result<()> {
        self.db.delete_body(self.id, mailbox, uid)
    }

    /// Drop every body of `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the rows cannot be deleted.
    pub fn remove_mailbox(&self, mailbox: u64) -> Result<()> {
        self.db.delete_mailbox(self.id, mailbox)
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the database cannot be read.
    pub fn len(&self) -> Result<usize> {
        self.db.count_bodies(self.id)
    }

    /// # Errors
    ///
    /// As [`BodyStore::len`].
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Drop for BodyStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.delete_store(self.id) {
            warn!("Failed to clear cached bodies: {e}");
        }
    }
}
