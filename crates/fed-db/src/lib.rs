//! # fed-db
//!
//! libSQL persistence for the feasibility federation.
//!
//! Stores query contents (content-addressed by hash), queries, broker
//! dispatches, sites, and per-site results. The `(query_id, site_id)`
//! uniqueness constraint on results is the single serialization point for
//! "first result wins"; `FedService::save_result` reports a conflict as
//! [`repos::result::SaveOutcome::AlreadyExists`] instead of an error.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;

use error::DatabaseError;
use libsql::Builder;

/// Central database handle.
///
/// Wraps a libSQL database and a single shared connection. The connection is
/// cheap to clone and safe to use from many tasks at once.
pub struct FedDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl FedDb {
    /// Open a local database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let fed_db = Self { db, conn };
        fed_db.run_migrations().await?;
        tracing::debug!(path, "database opened");
        Ok(fed_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"qry-a3f8b2c1"`.
    ///
    /// Uses `randomblob(4)` in SQL to produce 8-char hex, then prepends the prefix.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn
            .query("SELECT ?1 || '-' || lower(hex(randomblob(4)))", [prefix])
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }
}
