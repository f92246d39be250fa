//! Aktin broker: stateful remote broker with a push event stream.
//!
//! Requests are managed over bearer-authenticated REST. Site status changes
//! arrive on a server-sent event stream that is reconnected at a fixed
//! interval whenever it drops, for as long as the client lives.
//!
//! REST surface (relative to `base_url`):
//! - `POST broker/request` → `201`, request id in the `Location` header
//! - `PUT broker/request/{id}` with `Content-Type: text/cql` → definition
//! - `POST broker/request/{id}/publish`
//! - `POST broker/request/{id}/closed`
//! - `GET broker/request/{id}/status` → `[{"node": "2", "status": "completed"}]`
//! - `GET broker/request/{id}/result/{node}` → plain-text count
//! - `GET broker/node/{node}` → `{"id": "2", "clientDN": "CN=Klinikum,O=..."}`
//! - `GET broker/events` → SSE, `data: {"request": "17", "node": "2", "status": "completed"}`

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use fed_config::AktinBrokerConfig;
use fed_core::enums::{BrokerType, MediaType, QueryStatus};
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::error::BrokerError;
use crate::http::{check_response, join_url, parse_count};
use crate::status::{QueryStatusUpdate, StatusFanout, StatusSender};

#[derive(Debug)]
struct AktinQuery {
    backend_query_id: String,
    closed: bool,
}

/// One event from the broker's push stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AktinEvent {
    pub request: String,
    pub node: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct NodeStatus {
    node: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(rename = "clientDN")]
    client_dn: String,
}

/// Map an Aktin request status to a site query status. Lifecycle markers
/// that concern the request as a whole (`published`, `closed`) map to `None`.
#[must_use]
pub fn map_status(status: &str) -> Option<QueryStatus> {
    match status {
        "retrieved" => Some(QueryStatus::Retrieved),
        "queued" => Some(QueryStatus::Queued),
        "processing" => Some(QueryStatus::Executing),
        "completed" => Some(QueryStatus::Completed),
        "failed" | "rejected" | "expired" => Some(QueryStatus::Failed),
        _ => None,
    }
}

/// Extract the common name from an X.500 distinguished name, falling back
/// to the whole string.
fn common_name(dn: &str) -> String {
    dn.split(',')
        .find_map(|part| part.trim().strip_prefix("CN="))
        .unwrap_or(dn)
        .trim()
        .to_string()
}

#[derive(Debug)]
struct AktinInner {
    http: reqwest::Client,
    config: AktinBrokerConfig,
    queries: DashMap<String, AktinQuery>,
    site_names: DashMap<String, String>,
    listeners: StatusFanout,
}

/// Client for an Aktin broker.
#[derive(Debug, Clone)]
pub struct AktinBrokerClient {
    inner: Arc<AktinInner>,
    event_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AktinBrokerClient {
    /// Create a client and start the push event loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` fails to build.
    #[must_use]
    pub fn connect(config: AktinBrokerConfig) -> Self {
        let client = Self::new(config);
        client.start_event_stream();
        client
    }

    /// Create a client without the push event loop.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` fails to build.
    #[must_use]
    pub fn new(config: AktinBrokerConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("fedq/0.1")
            .build()
            .expect("reqwest client should build");
        Self {
            inner: Arc::new(AktinInner {
                http,
                config,
                queries: DashMap::new(),
                site_names: DashMap::new(),
                listeners: StatusFanout::default(),
            }),
            event_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the event loop if it is not already running.
    pub fn start_event_stream(&self) {
        let mut task = self.event_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run_event_loop().await }));
    }

    /// Stop the event loop. Pending REST calls are unaffected.
    pub fn shutdown(&self) {
        if let Some(task) = self
            .event_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.inner.listeners.clear();
    }

    pub fn add_status_listener(&self, listener: StatusSender) {
        self.inner.listeners.add(listener);
    }

    pub async fn create_query(&self, backend_query_id: &str) -> Result<String, BrokerError> {
        let resp = self
            .inner
            .request(reqwest::Method::POST, "broker/request")
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let id = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BrokerError::Parse("request creation returned no Location".into()))?;

        self.inner.queries.insert(
            id.clone(),
            AktinQuery {
                backend_query_id: backend_query_id.to_string(),
                closed: false,
            },
        );
        tracing::debug!(broker_query_id = %id, backend_query_id, "aktin request created");
        Ok(id)
    }

    pub async fn add_query_definition(
        &self,
        broker_query_id: &str,
        media_type: MediaType,
        content: &str,
    ) -> Result<(), BrokerError> {
        if media_type != MediaType::Cql {
            return Err(BrokerError::UnsupportedMediaType {
                broker: BrokerType::Aktin,
                media_type,
            });
        }
        self.inner.ensure_known(broker_query_id)?;
        let resp = self
            .inner
            .request(reqwest::Method::PUT, &format!("broker/request/{broker_query_id}"))
            .header(reqwest::header::CONTENT_TYPE, media_type.as_str())
            .body(content.to_string())
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    pub async fn publish_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        self.inner.ensure_known(broker_query_id)?;
        self.inner
            .send_publish(broker_query_id)
            .await
            .map_err(|e| BrokerError::PublishFailed {
                broker: BrokerType::Aktin,
                reason: e.to_string(),
            })?;
        tracing::info!(broker_query_id, "aktin request published");
        Ok(())
    }

    pub async fn close_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        {
            let mut query = self
                .inner
                .queries
                .get_mut(broker_query_id)
                .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
            query.closed = true;
        }
        let resp = self
            .inner
            .request(
                reqwest::Method::POST,
                &format!("broker/request/{broker_query_id}/closed"),
            )
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    pub async fn get_result_feasibility(
        &self,
        broker_query_id: &str,
        site_id: &str,
    ) -> Result<u64, BrokerError> {
        self.inner.ensure_known(broker_query_id)?;
        let resp = self
            .inner
            .request(
                reqwest::Method::GET,
                &format!("broker/request/{broker_query_id}/result/{site_id}"),
            )
            .send()
            .await?;
        let resp = check_response(resp).await.map_err(|e| {
            if e.is_not_found() {
                BrokerError::SiteNotFound(site_id.to_string())
            } else {
                e
            }
        })?;
        parse_count(&resp.text().await?)
    }

    pub async fn get_result_site_ids(
        &self,
        broker_query_id: &str,
    ) -> Result<Vec<String>, BrokerError> {
        self.inner.ensure_known(broker_query_id)?;
        let resp = self
            .inner
            .request(
                reqwest::Method::GET,
                &format!("broker/request/{broker_query_id}/status"),
            )
            .send()
            .await?;
        let resp = check_response(resp).await.map_err(|e| {
            if e.is_not_found() {
                BrokerError::QueryNotFound(broker_query_id.to_string())
            } else {
                e
            }
        })?;
        let statuses: Vec<NodeStatus> = resp
            .json()
            .await
            .map_err(|e| BrokerError::Parse(format!("request status: {e}")))?;
        Ok(statuses
            .into_iter()
            .filter(|s| s.status == "completed")
            .map(|s| s.node)
            .collect())
    }

    pub async fn get_site_name(&self, site_id: &str) -> Result<String, BrokerError> {
        if let Some(name) = self.inner.site_names.get(site_id) {
            return Ok(name.clone());
        }
        let resp = self
            .inner
            .request(reqwest::Method::GET, &format!("broker/node/{site_id}"))
            .send()
            .await?;
        let resp = check_response(resp).await.map_err(|e| {
            if e.is_not_found() {
                BrokerError::SiteNotFound(site_id.to_string())
            } else {
                e
            }
        })?;
        let node: NodeInfo = resp
            .json()
            .await
            .map_err(|e| BrokerError::Parse(format!("node info: {e}")))?;
        let name = common_name(&node.client_dn);
        self.inner
            .site_names
            .insert(site_id.to_string(), name.clone());
        Ok(name)
    }

    /// Feed one raw event payload through the status mapping, as the event
    /// loop does. Exposed for replaying recorded streams.
    pub fn handle_event_data(&self, data: &str) {
        self.inner.handle_event_data(data);
    }
}

impl AktinInner {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, join_url(&self.config.base_url, path))
            .bearer_auth(&self.config.api_key)
    }

    async fn send_publish(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("broker/request/{broker_query_id}/publish"),
            )
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    fn ensure_known(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        if self.queries.contains_key(broker_query_id) {
            Ok(())
        } else {
            Err(BrokerError::QueryNotFound(broker_query_id.to_string()))
        }
    }

    async fn run_event_loop(&self) {
        let reconnect = Duration::from_secs(self.config.reconnect_secs.max(1));
        loop {
            let request = self.request(reqwest::Method::GET, "broker/events");
            match EventSource::new(request) {
                Ok(mut source) => {
                    while let Some(event) = source.next().await {
                        match event {
                            Ok(Event::Open) => tracing::info!("aktin event stream connected"),
                            Ok(Event::Message(msg)) => self.handle_event_data(&msg.data),
                            Err(e) => {
                                tracing::warn!(%e, "aktin event stream interrupted");
                                source.close();
                                break;
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(%e, "aktin event stream request could not be built"),
            }
            tracing::debug!(?reconnect, "reconnecting aktin event stream");
            tokio::time::sleep(reconnect).await;
        }
    }

    fn handle_event_data(&self, data: &str) {
        if data.is_empty() || data == "keepalive" {
            return;
        }
        let event: AktinEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%e, data, "unparseable aktin event");
                return;
            }
        };
        let Some(status) = map_status(&event.status) else {
            tracing::debug!(request = %event.request, status = %event.status, "ignoring aktin request event");
            return;
        };
        let Some(query) = self.queries.get(&event.request) else {
            tracing::debug!(request = %event.request, "event for unknown aktin request");
            return;
        };
        if query.closed {
            return;
        }
        self.listeners.notify(
            &query.backend_query_id,
            QueryStatusUpdate {
                source: BrokerType::Aktin,
                broker_query_id: event.request,
                broker_site_id: event.node,
                status,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_channel;
    use rstest::rstest;

    #[rstest]
    #[case("retrieved", Some(QueryStatus::Retrieved))]
    #[case("queued", Some(QueryStatus::Queued))]
    #[case("processing", Some(QueryStatus::Executing))]
    #[case("completed", Some(QueryStatus::Completed))]
    #[case("rejected", Some(QueryStatus::Failed))]
    #[case("expired", Some(QueryStatus::Failed))]
    #[case("published", None)]
    #[case("closed", None)]
    fn status_mapping(#[case] raw: &str, #[case] expected: Option<QueryStatus>) {
        assert_eq!(map_status(raw), expected);
    }

    #[test]
    fn common_name_from_dn() {
        assert_eq!(common_name("CN=Klinikum Erlangen,O=FAU,C=DE"), "Klinikum Erlangen");
        assert_eq!(common_name("O=FAU, CN=Leipzig"), "Leipzig");
        assert_eq!(common_name("Mainz"), "Mainz");
    }

    fn client_with_query(id: &str, closed: bool) -> (AktinBrokerClient, crate::status::StatusReceiver) {
        let client = AktinBrokerClient::new(AktinBrokerConfig::default());
        client.inner.queries.insert(
            id.to_string(),
            AktinQuery {
                backend_query_id: "qry-00000001".into(),
                closed,
            },
        );
        let (tx, rx) = status_channel();
        client.add_status_listener(tx);
        (client, rx)
    }

    #[test]
    fn event_for_known_request_is_forwarded() {
        let (client, mut rx) = client_with_query("17", false);
        client.handle_event_data(r#"{"request":"17","node":"3","status":"completed"}"#);
        let n = rx.try_recv().unwrap();
        assert_eq!(n.backend_query_id, "qry-00000001");
        assert_eq!(n.update.broker_site_id, "3");
        assert_eq!(n.update.status, QueryStatus::Completed);
    }

    #[test]
    fn events_for_closed_unknown_or_malformed_are_dropped() {
        let (client, mut rx) = client_with_query("17", true);
        client.handle_event_data(r#"{"request":"17","node":"3","status":"completed"}"#);
        client.handle_event_data(r#"{"request":"99","node":"3","status":"completed"}"#);
        client.handle_event_data("keepalive");
        client.handle_event_data("{not json");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_request_fails_fast() {
        let client = AktinBrokerClient::new(AktinBrokerConfig::default());
        assert!(matches!(
            client.publish_query("404").await,
            Err(BrokerError::QueryNotFound(_))
        ));
        assert!(matches!(
            client.add_query_definition("404", MediaType::StructuredQuery, "{}").await,
            Err(BrokerError::UnsupportedMediaType { .. })
        ));
    }
}
