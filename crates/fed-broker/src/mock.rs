//! Simulated broker.
//!
//! Every configured site answers after a random delay with a random match
//! count. One task per `(query, site)` runs on a bounded worker pool (a
//! shared semaphore); `close_query` aborts the query's tasks, and the closed
//! flag is checked under the query's map entry before every notification so
//! nothing is emitted once `close_query` returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use fed_config::MockBrokerConfig;
use fed_core::enums::{BrokerType, MediaType, QueryStatus};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::BrokerError;
use crate::status::{QueryStatusUpdate, StatusFanout, StatusSender};

const SUPPORTED_MEDIA_TYPES: [MediaType; 2] = [MediaType::StructuredQuery, MediaType::Cql];

#[derive(Debug, Default)]
struct MockQuery {
    backend_query_id: String,
    definitions: HashMap<MediaType, String>,
    published: bool,
    closed: bool,
    results: HashMap<String, u64>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct MockInner {
    config: MockBrokerConfig,
    queries: DashMap<String, MockQuery>,
    next_id: AtomicU64,
    workers: Arc<Semaphore>,
    listeners: StatusFanout,
}

/// In-process broker simulating a fixed set of sites.
#[derive(Debug, Clone)]
pub struct MockBrokerClient {
    inner: Arc<MockInner>,
}

impl MockBrokerClient {
    #[must_use]
    pub fn new(config: MockBrokerConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            inner: Arc::new(MockInner {
                config,
                queries: DashMap::new(),
                next_id: AtomicU64::new(1),
                workers,
                listeners: StatusFanout::default(),
            }),
        }
    }

    pub fn add_status_listener(&self, listener: StatusSender) {
        self.inner.listeners.add(listener);
    }

    pub fn create_query(&self, backend_query_id: &str) -> String {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.inner.queries.insert(
            id.clone(),
            MockQuery {
                backend_query_id: backend_query_id.to_string(),
                ..MockQuery::default()
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
        if !SUPPORTED_MEDIA_TYPES.contains(&media_type) {
            return Err(BrokerError::UnsupportedMediaType {
                broker: BrokerType::Mock,
                media_type,
            });
        }
        let mut query = self
            .inner
            .queries
            .get_mut(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        query.definitions.insert(media_type, content.to_string());
        Ok(())
    }

    /// Start one simulated execution per configured site.
    pub fn publish_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        let mut query = self
            .inner
            .queries
            .get_mut(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        if query.published || query.closed {
            return Err(BrokerError::PublishFailed {
                broker: BrokerType::Mock,
                reason: format!("query {broker_query_id} was already published or closed"),
            });
        }
        query.published = true;

        for site_id in &self.inner.config.site_ids {
            let inner = Arc::clone(&self.inner);
            let broker_query_id = broker_query_id.to_string();
            let site_id = site_id.clone();
            query
                .tasks
                .push(tokio::spawn(async move { inner.simulate_site(broker_query_id, site_id).await }));
        }
        tracing::info!(
            broker_query_id,
            sites = self.inner.config.site_ids.len(),
            "mock query published"
        );
        Ok(())
    }

    pub fn close_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        let mut query = self
            .inner
            .queries
            .get_mut(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        query.closed = true;
        query.definitions.clear();
        for task in query.tasks.drain(..) {
            task.abort();
        }
        tracing::info!(broker_query_id, "mock query closed");
        Ok(())
    }

    pub fn get_result_feasibility(
        &self,
        broker_query_id: &str,
        site_id: &str,
    ) -> Result<u64, BrokerError> {
        let query = self
            .inner
            .queries
            .get(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        query
            .results
            .get(site_id)
            .copied()
            .ok_or_else(|| BrokerError::SiteNotFound(site_id.to_string()))
    }

    pub fn get_result_site_ids(&self, broker_query_id: &str) -> Result<Vec<String>, BrokerError> {
        let query = self
            .inner
            .queries
            .get(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        let mut ids: Vec<String> = query.results.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub fn get_site_name(&self, site_id: &str) -> Result<String, BrokerError> {
        if !self.inner.config.site_ids.iter().any(|id| id == site_id) {
            return Err(BrokerError::SiteNotFound(site_id.to_string()));
        }
        Ok(self
            .inner
            .config
            .site_names
            .get(site_id)
            .cloned()
            .unwrap_or_else(|| site_id.to_string()))
    }

    /// Abort every outstanding simulation and release listeners.
    pub fn shutdown(&self) {
        for mut query in self.inner.queries.iter_mut() {
            query.closed = true;
            for task in query.tasks.drain(..) {
                task.abort();
            }
        }
        self.inner.listeners.clear();
    }
}

impl MockInner {
    async fn simulate_site(&self, broker_query_id: String, site_id: String) {
        if !self.emit(&broker_query_id, &site_id, QueryStatus::Queued, None) {
            return;
        }

        let Ok(_permit) = Arc::clone(&self.workers).acquire_owned().await else {
            return;
        };
        if !self.emit(&broker_query_id, &site_id, QueryStatus::Executing, None) {
            return;
        }

        let delay = random_in_range(self.config.min_delay_ms, self.config.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let count = random_in_range(self.config.min_result, self.config.max_result);
        self.emit(&broker_query_id, &site_id, QueryStatus::Completed, Some(count));
    }

    /// Record `result` (if any) and notify, unless the query was closed.
    /// Returns `false` once the query is closed or gone.
    fn emit(
        &self,
        broker_query_id: &str,
        site_id: &str,
        status: QueryStatus,
        result: Option<u64>,
    ) -> bool {
        let Some(mut query) = self.queries.get_mut(broker_query_id) else {
            return false;
        };
        if query.closed {
            return false;
        }
        if let Some(count) = result {
            query.results.insert(site_id.to_string(), count);
        }
        self.listeners.notify(
            &query.backend_query_id,
            QueryStatusUpdate {
                source: BrokerType::Mock,
                broker_query_id: broker_query_id.to_string(),
                broker_site_id: site_id.to_string(),
                status,
            },
        );
        true
    }
}

/// Uniform-ish random value in `[min, max]`. Falls back to `min` if the OS
/// random source is unavailable.
fn random_in_range(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    getrandom::u64().map_or(min, |r| {
        // `None` only for the full `u64` range, where any value fits.
        match (max - min).checked_add(1) {
            Some(span) => min + r % span,
            None => r,
        }
    })
}
