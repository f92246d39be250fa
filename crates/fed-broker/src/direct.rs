//! Direct broker: one synchronous HTTP round trip to a single evaluation
//! endpoint.
//!
//! There is exactly one site. Publishing POSTs the query (CQL or structured
//! query, per configuration) and expects the match count as a plain-text
//! body. The intermediate states are synthesized before the terminal one so
//! listeners see the same lifecycle as with asynchronous brokers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use fed_config::DirectBrokerConfig;
use fed_core::enums::{BrokerType, MediaType, QueryStatus};

use crate::error::BrokerError;
use crate::http::{check_response, parse_count};
use crate::status::{QueryStatusUpdate, StatusFanout, StatusSender};

/// Site id of the single site behind a direct broker.
pub const DIRECT_SITE_ID: &str = "1";

#[derive(Debug, Default)]
struct DirectQuery {
    backend_query_id: String,
    definitions: HashMap<MediaType, String>,
    result: Option<u64>,
    closed: bool,
}

/// Broker evaluating queries against one FHIR/CQL endpoint.
#[derive(Debug)]
pub struct DirectBrokerClient {
    http: reqwest::Client,
    config: DirectBrokerConfig,
    queries: DashMap<String, DirectQuery>,
    next_id: AtomicU64,
    listeners: StatusFanout,
}

impl DirectBrokerClient {
    /// Create a client for the configured endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` fails to build.
    #[must_use]
    pub fn new(config: DirectBrokerConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("fedq/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client should build");
        Self {
            http,
            config,
            queries: DashMap::new(),
            next_id: AtomicU64::new(1),
            listeners: StatusFanout::default(),
        }
    }

    /// Media type this broker sends on publish.
    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        if self.config.use_cql {
            MediaType::Cql
        } else {
            MediaType::StructuredQuery
        }
    }

    pub fn add_status_listener(&self, listener: StatusSender) {
        self.listeners.add(listener);
    }

    pub fn create_query(&self, backend_query_id: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.queries.insert(
            id.clone(),
            DirectQuery {
                backend_query_id: backend_query_id.to_string(),
                ..DirectQuery::default()
            },
        );
        id
    }

    pub fn add_query_definition(
        &self,
        broker_query_id: &str,
        media_type: MediaType,
        content: &str,
    ) -> Result<(), BrokerError> {
        if media_type == MediaType::FhirCodex {
            return Err(BrokerError::UnsupportedMediaType {
                broker: BrokerType::Direct,
                media_type,
            });
        }
        let mut query = self
            .queries
            .get_mut(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        query.definitions.insert(media_type, content.to_string());
        Ok(())
    }

    /// Evaluate the query and deliver the full status sequence.
    ///
    /// An evaluation failure is reported to listeners as `Failed`; only a
    /// missing query or definition fails the call itself.
    pub async fn publish_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        let media_type = self.media_type();
        let body = {
            let query = self
                .queries
                .get(broker_query_id)
                .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
            query
                .definitions
                .get(&media_type)
                .cloned()
                .ok_or_else(|| BrokerError::PublishFailed {
                    broker: BrokerType::Direct,
                    reason: format!("query {broker_query_id} has no {media_type} definition"),
                })?
        };

        self.emit(broker_query_id, QueryStatus::Queued, None);
        self.emit(broker_query_id, QueryStatus::Executing, None);

        match self.evaluate(media_type, body).await {
            Ok(count) => {
                tracing::info!(broker_query_id, count, "direct evaluation completed");
                self.emit(broker_query_id, QueryStatus::Completed, Some(count));
            }
            Err(e) => {
                tracing::warn!(broker_query_id, %e, "direct evaluation failed");
                self.emit(broker_query_id, QueryStatus::Failed, None);
            }
        }
        Ok(())
    }

    async fn evaluate(&self, media_type: MediaType, body: String) -> Result<u64, BrokerError> {
        let mut request = self
            .http
            .post(&self.config.url)
            .header(reqwest::header::CONTENT_TYPE, media_type.as_str())
            .header(reqwest::header::ACCEPT, "text/plain")
            .body(body);
        if let Some((user, password)) = self.config.credentials() {
            request = request.basic_auth(user, Some(password));
        }
        let resp = check_response(request.send().await?).await?;
        parse_count(&resp.text().await?)
    }

    pub fn close_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        let mut query = self
            .queries
            .get_mut(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        query.closed = true;
        query.definitions.clear();
        Ok(())
    }

    pub fn get_result_feasibility(
        &self,
        broker_query_id: &str,
        site_id: &str,
    ) -> Result<u64, BrokerError> {
        let query = self
            .queries
            .get(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        if site_id != DIRECT_SITE_ID {
            return Err(BrokerError::SiteNotFound(site_id.to_string()));
        }
        query
            .result
            .ok_or_else(|| BrokerError::SiteNotFound(site_id.to_string()))
    }

    pub fn get_result_site_ids(&self, broker_query_id: &str) -> Result<Vec<String>, BrokerError> {
        let query = self
            .queries
            .get(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        Ok(query
            .result
            .map(|_| vec![DIRECT_SITE_ID.to_string()])
            .unwrap_or_default())
    }

    pub fn get_site_name(&self, site_id: &str) -> Result<String, BrokerError> {
        if site_id == DIRECT_SITE_ID {
            Ok(self.config.site_name.clone())
        } else {
            Err(BrokerError::SiteNotFound(site_id.to_string()))
        }
    }

    /// Release listeners; evaluation runs on the caller's task, so there is
    /// nothing else to stop.
    pub fn shutdown(&self) {
        self.listeners.clear();
    }

    fn emit(&self, broker_query_id: &str, status: QueryStatus, result: Option<u64>) {
        let Some(mut query) = self.queries.get_mut(broker_query_id) else {
            return;
        };
        if query.closed {
            return;
        }
        if result.is_some() {
            query.result = result;
        }
        self.listeners.notify(
            &query.backend_query_id,
            QueryStatusUpdate {
                source: BrokerType::Direct,
                broker_query_id: broker_query_id.to_string(),
                broker_site_id: DIRECT_SITE_ID.to_string(),
                status,
            },
        );
    }
}
