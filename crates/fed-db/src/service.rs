//! Service layer hosting the repository methods.
//!
//! `FedService` wraps `FedDb`. All repo methods are implemented as
//! `impl FedService` blocks in `crate::repos`, so callers hold one handle
//! (typically behind an `Arc`) for every persistence concern.

use crate::FedDb;
use crate::error::DatabaseError;

pub struct FedService {
    db: FedDb,
}

impl FedService {
    /// Create a new service on a local database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = FedDb::open_local(db_path).await?;
        Ok(Self { db })
    }

    /// Create from an existing `FedDb`.
    #[must_use]
    pub const fn from_db(db: FedDb) -> Self {
        Self { db }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &FedDb {
        &self.db
    }
}
