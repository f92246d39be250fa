//! Query result repository.
//!
//! The `(query_id, site_id)` unique constraint is the only arbiter of which
//! notification wins. A losing write is reported as
//! [`SaveOutcome::AlreadyExists`], never as an error, and never overwrites.

use chrono::Utc;

use fed_core::entities::{NewQueryResult, QueryResult};
use fed_core::ids::PREFIX_RESULT;

use crate::error::DatabaseError;
use crate::helpers::{count_from_sql, count_to_sql, parse_datetime, parse_enum};
use crate::service::FedService;

/// Outcome of [`FedService::save_result`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The result was stored.
    Saved(QueryResult),
    /// A result for the same `(query_id, site_id)` already existed; nothing was written.
    AlreadyExists,
}

impl SaveOutcome {
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

fn row_to_result(row: &libsql::Row) -> Result<QueryResult, DatabaseError> {
    Ok(QueryResult {
        id: row.get::<String>(0)?,
        query_id: row.get::<String>(1)?,
        site_id: row.get::<String>(2)?,
        result_type: parse_enum(&row.get::<String>(3)?)?,
        result: count_from_sql(row.get::<Option<i64>>(4)?)?,
        received_at: parse_datetime(&row.get::<String>(5)?)?,
    })
}

impl FedService {
    pub async fn save_result(&self, result: &NewQueryResult) -> Result<SaveOutcome, DatabaseError> {
        let now = Utc::now();
        let id = self.db().generate_id(PREFIX_RESULT).await?;

        let inserted = self
            .db()
            .conn()
            .execute(
                "INSERT INTO results (id, query_id, site_id, result_type, result, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(query_id, site_id) DO NOTHING",
                libsql::params![
                    id.as_str(),
                    result.query_id(),
                    result.site_id(),
                    result.result_type().as_str(),
                    count_to_sql(result.result())?,
                    now.to_rfc3339()
                ],
            )
            .await?;

        if inserted == 0 {
            return Ok(SaveOutcome::AlreadyExists);
        }

        Ok(SaveOutcome::Saved(QueryResult {
            id,
            query_id: result.query_id().to_string(),
            site_id: result.site_id().to_string(),
            result_type: result.result_type(),
            result: result.result(),
            received_at: now,
        }))
    }

    pub async fn find_result(
        &self,
        query_id: &str,
        site_id: &str,
    ) -> Result<Option<QueryResult>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, query_id, site_id, result_type, result, received_at
                 FROM results WHERE query_id = ?1 AND site_id = ?2",
                libsql::params![query_id, site_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_result(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_results(&self, query_id: &str) -> Result<Vec<QueryResult>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, query_id, site_id, result_type, result, received_at
                 FROM results WHERE query_id = ?1 ORDER BY received_at, id",
                [query_id],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_result(&row)?);
        }
        Ok(results)
    }
}
