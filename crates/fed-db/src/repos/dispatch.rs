//! Broker dispatch repository.
//!
//! One row per `(query_id, broker_type)`, written after a successful publish.

use chrono::Utc;

use fed_core::entities::BrokerDispatch;
use fed_core::enums::BrokerType;

use crate::error::DatabaseError;
use crate::helpers::{parse_datetime, parse_enum};
use crate::service::FedService;

fn row_to_dispatch(row: &libsql::Row) -> Result<BrokerDispatch, DatabaseError> {
    Ok(BrokerDispatch {
        query_id: row.get::<String>(0)?,
        broker_type: parse_enum(&row.get::<String>(1)?)?,
        broker_query_id: row.get::<String>(2)?,
        dispatched_at: parse_datetime(&row.get::<String>(3)?)?,
    })
}

impl FedService {
    /// Record that `query_id` was published through `broker_type`.
    ///
    /// The row is immutable: a second call for the same key keeps the
    /// original row and returns it.
    pub async fn save_broker_dispatch(
        &self,
        query_id: &str,
        broker_type: BrokerType,
        broker_query_id: &str,
    ) -> Result<BrokerDispatch, DatabaseError> {
        let now = Utc::now();
        let inserted = self
            .db()
            .conn()
            .execute(
                "INSERT INTO broker_dispatches (query_id, broker_type, broker_query_id, dispatched_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(query_id, broker_type) DO NOTHING",
                libsql::params![query_id, broker_type.as_str(), broker_query_id, now.to_rfc3339()],
            )
            .await?;

        if inserted == 0 {
            tracing::warn!(query_id, broker = %broker_type, "query was already dispatched to broker");
            return self
                .find_broker_dispatch(query_id, broker_type)
                .await?
                .ok_or(DatabaseError::NoResult);
        }

        Ok(BrokerDispatch {
            query_id: query_id.to_string(),
            broker_type,
            broker_query_id: broker_query_id.to_string(),
            dispatched_at: now,
        })
    }

    pub async fn find_broker_dispatch(
        &self,
        query_id: &str,
        broker_type: BrokerType,
    ) -> Result<Option<BrokerDispatch>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT query_id, broker_type, broker_query_id, dispatched_at
                 FROM broker_dispatches WHERE query_id = ?1 AND broker_type = ?2",
                libsql::params![query_id, broker_type.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_dispatch(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_broker_dispatches(
        &self,
        query_id: &str,
    ) -> Result<Vec<BrokerDispatch>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT query_id, broker_type, broker_query_id, dispatched_at
                 FROM broker_dispatches WHERE query_id = ?1 ORDER BY dispatched_at, broker_type",
                [query_id],
            )
            .await?;

        let mut dispatches = Vec::new();
        while let Some(row) = rows.next().await? {
            dispatches.push(row_to_dispatch(&row)?);
        }
        Ok(dispatches)
    }
}
