//! SQLite access for the aggregation batch.
//!
//! The store is shared with the upstream enrichment stage: `messages` and
//! `extractions` are written there and only read here, while
//! `cluster_filter_audit` is owned by this crate. At most one aggregation
//! job runs against a given store at a time, so no locking beyond SQLite's
//! own is used.

use std::path::Path;

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub mod audit;
pub mod messages;

pub struct AggregateDb {
    conn: Connection,
}

impl AggregateDb {
    /// Open the store at `path`, creating the file and any missing parent
    /// directories, and bring its schema up to date. WAL keeps concurrent
    /// readers (the upstream enrichment stage) cheap.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
            _ => {}
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        // FK enforcement goes on after migrations so a future migration can
        // recreate tables with it off.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(AggregateDb { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside BEGIN IMMEDIATE / COMMIT; any Err from the closure
    /// rolls the transaction back and passes through.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Self) -> Result<T, String>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("begin transaction: {e}"))?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| format!("commit transaction: {e}"))?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
