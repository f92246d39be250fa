//! Content-addressed enqueue and broker fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use fed_broker::{BrokerClient, BrokerError, BrokerRegistry};
use fed_core::entities::{BrokerDispatch, StructuredQuery};
use fed_core::enums::{DispatchPolicy, MediaType};
use fed_core::hash::QueryHashCalculator;
use fed_db::error::DatabaseError;
use fed_db::service::FedService;

use crate::error::DispatchError;
use crate::translate::QueryTranslator;

/// Persists queries and broadcasts them to every configured broker.
///
/// Broker round trips run on the caller's task, one broker after the other,
/// in registry order.
pub struct QueryDispatcher<T> {
    service: Arc<FedService>,
    brokers: Arc<BrokerRegistry>,
    translator: T,
    hasher: QueryHashCalculator,
    policy: DispatchPolicy,
}

impl<T: QueryTranslator> QueryDispatcher<T> {
    pub fn new(service: Arc<FedService>, brokers: Arc<BrokerRegistry>, translator: T) -> Self {
        Self {
            service,
            brokers,
            translator,
            hasher: QueryHashCalculator,
            policy: DispatchPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Store the query content (once per distinct body) and create a new
    /// query referencing it. Returns the new query id.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` if the query cannot be serialized or stored.
    pub async fn enqueue(
        &self,
        query: &StructuredQuery,
        created_by: &str,
    ) -> Result<String, DispatchError> {
        let body = query.to_body()?;
        let hash = self.hasher.calculate_hash(Some(body.as_str()))?;

        let content = match self.service.find_query_content_by_hash(&hash).await? {
            Some(existing) => existing,
            None => self.service.save_query_content(&hash, &body).await?,
        };
        let stored = self.service.save_query(&content.id, created_by).await?;

        tracing::info!(
            query_id = %stored.id,
            query_content_id = %content.id,
            created_by,
            "query enqueued"
        );
        Ok(stored.id)
    }

    /// Translate the stored query and publish it to every broker.
    ///
    /// A broker that already carries this query is not published to again;
    /// its recorded dispatch is returned instead.
    ///
    /// Under [`DispatchPolicy::AllOrNothing`] the first failing broker aborts
    /// the call; brokers already published to stay published. Under
    /// [`DispatchPolicy::BestEffort`] failures are logged and the call fails
    /// only if no broker accepted the query.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` on a missing query, a translation failure, or a
    /// broker failure as governed by the policy.
    pub async fn dispatch(&self, query_id: &str) -> Result<Vec<BrokerDispatch>, DispatchError> {
        let query = self.service.get_query(query_id).await.map_err(|e| match e {
            DatabaseError::NoResult => DispatchError::QueryNotFound(query_id.to_string()),
            other => other.into(),
        })?;
        let content = self.service.get_query_content(&query.query_content_id).await?;
        let structured = StructuredQuery::from_body(&content.query_content)?;
        let representations = self.translator.translate(&structured).await?;

        if self.brokers.is_empty() {
            return Err(DispatchError::NoBrokers);
        }

        let mut dispatches = Vec::with_capacity(self.brokers.len());
        for broker in self.brokers.iter() {
            match self.dispatch_to(broker, query_id, &representations).await {
                Ok(dispatch) => dispatches.push(dispatch),
                Err(e) => match self.policy {
                    DispatchPolicy::AllOrNothing => {
                        tracing::error!(query_id, broker = %broker.broker_type(), %e, "dispatch aborted");
                        return Err(e);
                    }
                    DispatchPolicy::BestEffort => {
                        tracing::warn!(query_id, broker = %broker.broker_type(), %e, "broker skipped");
                    }
                },
            }
        }

        if dispatches.is_empty() {
            return Err(DispatchError::NoBrokerAccepted {
                attempted: self.brokers.len(),
            });
        }
        tracing::info!(query_id, brokers = dispatches.len(), "query dispatched");
        Ok(dispatches)
    }

    async fn dispatch_to(
        &self,
        broker: &BrokerClient,
        query_id: &str,
        representations: &HashMap<MediaType, String>,
    ) -> Result<BrokerDispatch, DispatchError> {
        let broker_type = broker.broker_type();
        let fail = |e: BrokerError| DispatchError::broker(broker_type, e);

        if let Some(existing) = self.service.find_broker_dispatch(query_id, broker_type).await? {
            tracing::debug!(query_id, broker = %broker_type, broker_query_id = %existing.broker_query_id, "query already dispatched to broker");
            return Ok(existing);
        }

        let broker_query_id = broker.create_query(query_id).await.map_err(fail)?;

        let mut ordered: Vec<(&MediaType, &String)> = representations.iter().collect();
        ordered.sort_by_key(|(media_type, _)| media_type.as_str());
        for (&media_type, content) in ordered {
            match broker
                .add_query_definition(&broker_query_id, media_type, content)
                .await
            {
                Ok(()) => {}
                Err(BrokerError::UnsupportedMediaType { .. }) => {
                    tracing::debug!(broker = %broker_type, %media_type, "representation not carried");
                }
                Err(e) => return Err(fail(e)),
            }
        }

        broker.publish_query(&broker_query_id).await.map_err(fail)?;

        let dispatch = self
            .service
            .save_broker_dispatch(query_id, broker_type, &broker_query_id)
            .await?;
        tracing::debug!(query_id, broker = %broker_type, broker_query_id = %dispatch.broker_query_id, "broker dispatch recorded");
        Ok(dispatch)
    }
}
