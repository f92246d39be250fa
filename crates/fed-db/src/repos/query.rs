//! Query and query-content repository.
//!
//! Query bodies are content-addressed: `save_query_content` returns the
//! existing row when the hash is already known, so identical bodies are
//! stored once no matter how many queries reference them.

use chrono::Utc;

use fed_core::entities::{Query, QueryContent};
use fed_core::ids::{PREFIX_QUERY, PREFIX_QUERY_CONTENT};

use crate::error::DatabaseError;
use crate::helpers::parse_datetime;
use crate::service::FedService;

fn row_to_query(row: &libsql::Row) -> Result<Query, DatabaseError> {
    Ok(Query {
        id: row.get::<String>(0)?,
        query_content_id: row.get::<String>(1)?,
        created_by: row.get::<String>(2)?,
        created_at: parse_datetime(&row.get::<String>(3)?)?,
    })
}

fn row_to_content(row: &libsql::Row) -> Result<QueryContent, DatabaseError> {
    Ok(QueryContent {
        id: row.get::<String>(0)?,
        query_content: row.get::<String>(1)?,
        hash: row.get::<String>(2)?,
    })
}

impl FedService {
    pub async fn find_query_content_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<QueryContent>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, query_content, hash FROM query_contents WHERE hash = ?1",
                [hash],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_content(&row)?)),
            None => Ok(None),
        }
    }

    /// Store `body` under `hash`, or return the row already stored for it.
    ///
    /// Concurrent callers with the same hash all receive the same row.
    pub async fn save_query_content(
        &self,
        hash: &str,
        body: &str,
    ) -> Result<QueryContent, DatabaseError> {
        let id = self.db().generate_id(PREFIX_QUERY_CONTENT).await?;
        let inserted = self
            .db()
            .conn()
            .execute(
                "INSERT INTO query_contents (id, query_content, hash) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash) DO NOTHING",
                libsql::params![id.as_str(), body, hash],
            )
            .await?;
        if inserted == 0 {
            tracing::debug!(hash, "query content already stored; reusing");
        }
        self.find_query_content_by_hash(hash)
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    pub async fn get_query_content(&self, id: &str) -> Result<QueryContent, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, query_content, hash FROM query_contents WHERE id = ?1",
                [id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_content(&row)
    }

    pub async fn save_query(
        &self,
        query_content_id: &str,
        created_by: &str,
    ) -> Result<Query, DatabaseError> {
        let now = Utc::now();
        let id = self.db().generate_id(PREFIX_QUERY).await?;

        self.db()
            .conn()
            .execute(
                "INSERT INTO queries (id, query_content_id, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![id.as_str(), query_content_id, created_by, now.to_rfc3339()],
            )
            .await?;

        Ok(Query {
            id,
            query_content_id: query_content_id.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
        })
    }

    /// Load a query, or `None` if no row has this id.
    pub async fn find_query(&self, id: &str) -> Result<Option<Query>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, query_content_id, created_by, created_at FROM queries WHERE id = ?1",
                [id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_query(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_query(&self, id: &str) -> Result<Query, DatabaseError> {
        self.find_query(id).await?.ok_or(DatabaseError::NoResult)
    }

    /// Number of queries sharing one content row.
    pub async fn count_queries_for_content(
        &self,
        query_content_id: &str,
    ) -> Result<u64, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT COUNT(*) FROM queries WHERE query_content_id = ?1",
                [query_content_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        let count = row.get::<i64>(0)?;
        u64::try_from(count).map_err(|_| DatabaseError::InvalidState(format!("negative count {count}")))
    }
}
