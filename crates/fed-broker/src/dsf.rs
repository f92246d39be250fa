//! DSF broker: task-based federation over FHIR `Task` resources.
//!
//! Publishing creates one parent `Task` carrying the query definitions.
//! Each site answers with its own `Task` (`based-on` the parent), whose
//! status is polled at a fixed interval until every site task seen so far
//! is terminal. Only forward transitions are reported; completed tasks carry
//! the count inline as an output value.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use fed_config::DsfBrokerConfig;
use fed_core::enums::{BrokerType, MediaType, QueryStatus};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::error::BrokerError;
use crate::http::{check_response, join_url};
use crate::status::{QueryStatusUpdate, StatusFanout, StatusSender};

const SUPPORTED_MEDIA_TYPES: [MediaType; 2] = [MediaType::StructuredQuery, MediaType::Cql];
const ORGANIZATION_IDENTIFIER_SYSTEM: &str = "http://dsf.dev/sid/organization-identifier";

// ── FHIR resources (subset) ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Bundle {
    #[serde(default)]
    entry: Vec<BundleEntry>,
}

#[derive(Debug, Deserialize)]
struct BundleEntry {
    resource: TaskResource,
}

#[derive(Debug, Deserialize)]
struct TaskResource {
    status: String,
    owner: Option<Reference>,
    #[serde(default)]
    output: Vec<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    identifier: Option<Identifier>,
    display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Identifier {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(rename = "valueUnsignedInt")]
    value_unsigned_int: Option<u64>,
}

/// Map a FHIR task status to a site query status. `draft` and `requested`
/// mean the site has not picked the task up yet.
#[must_use]
pub fn map_task_status(status: &str) -> Option<QueryStatus> {
    match status {
        "received" => Some(QueryStatus::Retrieved),
        "accepted" | "ready" => Some(QueryStatus::Queued),
        "in-progress" => Some(QueryStatus::Executing),
        "completed" => Some(QueryStatus::Completed),
        "failed" | "rejected" | "cancelled" | "entered-in-error" => Some(QueryStatus::Failed),
        _ => None,
    }
}

// ── Client ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SiteTask {
    status: Option<QueryStatus>,
    result: Option<u64>,
}

#[derive(Debug, Default)]
struct DsfQuery {
    backend_query_id: String,
    definitions: HashMap<MediaType, String>,
    task_id: Option<String>,
    sites: HashMap<String, SiteTask>,
    closed: bool,
    poller: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct DsfInner {
    http: reqwest::Client,
    config: DsfBrokerConfig,
    queries: DashMap<String, DsfQuery>,
    site_names: DashMap<String, String>,
    next_id: AtomicU64,
    listeners: StatusFanout,
}

/// Client for a DSF instance.
#[derive(Debug, Clone)]
pub struct DsfBrokerClient {
    inner: Arc<DsfInner>,
}

impl DsfBrokerClient {
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` fails to build.
    #[must_use]
    pub fn new(config: DsfBrokerConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("fedq/0.1")
            .build()
            .expect("reqwest client should build");
        Self {
            inner: Arc::new(DsfInner {
                http,
                config,
                queries: DashMap::new(),
                site_names: DashMap::new(),
                next_id: AtomicU64::new(1),
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
            DsfQuery {
                backend_query_id: backend_query_id.to_string(),
                ..DsfQuery::default()
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
                broker: BrokerType::Dsf,
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

    /// Create the parent task and start polling site tasks.
    pub async fn publish_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        let task = {
            let query = self
                .inner
                .queries
                .get(broker_query_id)
                .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
            if query.definitions.is_empty() {
                return Err(BrokerError::PublishFailed {
                    broker: BrokerType::Dsf,
                    reason: format!("query {broker_query_id} has no definitions"),
                });
            }
            self.inner
                .task_resource(&query.backend_query_id, &query.definitions)
        };

        let task_id = self
            .inner
            .create_task(&task)
            .await
            .map_err(|e| BrokerError::PublishFailed {
                broker: BrokerType::Dsf,
                reason: e.to_string(),
            })?;

        let mut query = self
            .inner
            .queries
            .get_mut(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        if query.closed {
            return Ok(());
        }
        query.definitions.clear();
        query.task_id = Some(task_id.clone());
        let inner = Arc::clone(&self.inner);
        let poll_query_id = broker_query_id.to_string();
        query.poller = Some(tokio::spawn(async move {
            inner.poll_site_tasks(poll_query_id, task_id).await;
        }));
        tracing::info!(broker_query_id, "dsf task published");
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
        if let Some(poller) = query.poller.take() {
            poller.abort();
        }
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
            .sites
            .get(site_id)
            .and_then(|site| site.result)
            .ok_or_else(|| BrokerError::SiteNotFound(site_id.to_string()))
    }

    pub fn get_result_site_ids(&self, broker_query_id: &str) -> Result<Vec<String>, BrokerError> {
        let query = self
            .inner
            .queries
            .get(broker_query_id)
            .ok_or_else(|| BrokerError::QueryNotFound(broker_query_id.to_string()))?;
        let mut ids: Vec<String> = query
            .sites
            .iter()
            .filter(|(_, site)| site.result.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn get_site_name(&self, site_id: &str) -> Result<String, BrokerError> {
        self.inner
            .site_names
            .get(site_id)
            .map(|name| name.clone())
            .ok_or_else(|| BrokerError::SiteNotFound(site_id.to_string()))
    }

    /// Stop every poller and release listeners.
    pub fn shutdown(&self) {
        for mut query in self.inner.queries.iter_mut() {
            if let Some(poller) = query.poller.take() {
                poller.abort();
            }
        }
        self.inner.listeners.clear();
    }
}

impl DsfInner {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, join_url(&self.config.base_url, path))
            .header(reqwest::header::ACCEPT, "application/fhir+json");
        if self.config.auth_token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.config.auth_token)
        }
    }

    fn task_resource(
        &self,
        backend_query_id: &str,
        definitions: &HashMap<MediaType, String>,
    ) -> serde_json::Value {
        let mut inputs: Vec<(&MediaType, &String)> = definitions.iter().collect();
        inputs.sort_by_key(|(media_type, _)| media_type.as_str());
        json!({
            "resourceType": "Task",
            "status": "requested",
            "intent": "order",
            "businessKey": backend_query_id,
            "requester": {
                "identifier": {
                    "system": ORGANIZATION_IDENTIFIER_SYSTEM,
                    "value": self.config.organization_id,
                }
            },
            "input": inputs
                .into_iter()
                .map(|(media_type, content)| json!({
                    "type": { "text": media_type.as_str() },
                    "valueString": content,
                }))
                .collect::<Vec<_>>(),
        })
    }

    async fn create_task(&self, task: &serde_json::Value) -> Result<String, BrokerError> {
        let resp = self
            .request(reqwest::Method::POST, "Task")
            .header(reqwest::header::CONTENT_TYPE, "application/fhir+json")
            .json(task)
            .send()
            .await?;
        let created: CreatedResource = check_response(resp)
            .await?
            .json()
            .await
            .map_err(|e| BrokerError::Parse(format!("created task: {e}")))?;
        Ok(created.id)
    }

    async fn fetch_site_tasks(&self, task_id: &str) -> Result<Bundle, BrokerError> {
        let path = format!(
            "Task?based-on={}",
            urlencoding::encode(&format!("Task/{task_id}"))
        );
        let resp = check_response(self.request(reqwest::Method::GET, &path).send().await?).await?;
        resp.json()
            .await
            .map_err(|e| BrokerError::Parse(format!("task bundle: {e}")))
    }

    async fn poll_site_tasks(&self, broker_query_id: String, task_id: String) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        loop {
            interval.tick().await;
            match self.fetch_site_tasks(&task_id).await {
                Ok(bundle) => {
                    if !self.apply_bundle(&broker_query_id, bundle) {
                        tracing::debug!(broker_query_id, "dsf polling finished");
                        return;
                    }
                }
                Err(e) => tracing::warn!(broker_query_id, %e, "dsf task poll failed"),
            }
        }
    }

    /// Record site task states and notify forward transitions. Returns
    /// `false` once polling can stop: the query is closed or gone, or every
    /// site task in the bundle has reached a terminal state.
    fn apply_bundle(&self, broker_query_id: &str, bundle: Bundle) -> bool {
        let Some(mut query) = self.queries.get_mut(broker_query_id) else {
            return false;
        };
        if query.closed {
            return false;
        }

        let mut pending = bundle.entry.is_empty();
        for entry in bundle.entry {
            let task = entry.resource;
            let Some(owner) = task.owner else { continue };
            let Some(site_id) = owner.identifier.map(|i| i.value) else {
                continue;
            };
            let Some(status) = map_task_status(&task.status) else {
                pending = true;
                continue;
            };
            if !status.is_terminal() {
                pending = true;
            }
            match owner.display {
                Some(name) => {
                    self.site_names.insert(site_id.clone(), name);
                }
                None => {
                    self.site_names
                        .entry(site_id.clone())
                        .or_insert_with(|| site_id.clone());
                }
            }

            let site = query.sites.entry(site_id.clone()).or_default();
            let is_forward = site.status.is_none_or(|current| current.can_transition_to(status));
            if !is_forward {
                continue;
            }
            site.status = Some(status);
            if status == QueryStatus::Completed {
                site.result = task.output.iter().find_map(|o| o.value_unsigned_int);
            }

            self.listeners.notify(
                &query.backend_query_id,
                QueryStatusUpdate {
                    source: BrokerType::Dsf,
                    broker_query_id: broker_query_id.to_string(),
                    broker_site_id: site_id,
                    status,
                },
            );
        }

        if !pending {
            query.poller = None;
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_channel;
    use pretty_assertions::assert_eq;

    fn bundle(json: &str) -> Bundle {
        serde_json::from_str(json).unwrap()
    }

    const IN_PROGRESS: &str = r#"{
        "resourceType": "Bundle",
        "entry": [
            {"resource": {"resourceType": "Task", "id": "t2", "status": "in-progress",
                          "owner": {"identifier": {"value": "2"}, "display": "Erlangen"}}},
            {"resource": {"resourceType": "Task", "id": "t3", "status": "requested",
                          "owner": {"identifier": {"value": "3"}}}}
        ]
    }"#;

    const COMPLETED: &str = r#"{
        "resourceType": "Bundle",
        "entry": [
            {"resource": {"resourceType": "Task", "id": "t2", "status": "completed",
                          "owner": {"identifier": {"value": "2"}, "display": "Erlangen"},
                          "output": [{"valueUnsignedInt": 77}]}},
            {"resource": {"resourceType": "Task", "id": "t3", "status": "failed",
                          "owner": {"identifier": {"value": "3"}, "display": "Leipzig"}}}
        ]
    }"#;

    #[test]
    fn task_status_mapping() {
        assert_eq!(map_task_status("in-progress"), Some(QueryStatus::Executing));
        assert_eq!(map_task_status("cancelled"), Some(QueryStatus::Failed));
        assert_eq!(map_task_status("requested"), None);
        assert_eq!(map_task_status("draft"), None);
    }

    #[test]
    fn bundles_drive_forward_transitions_only() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let (tx, mut rx) = status_channel();
        client.add_status_listener(tx);
        let id = client.create_query("qry-00000001");

        assert!(client.inner.apply_bundle(&id, bundle(IN_PROGRESS)));
        let first = rx.try_recv().unwrap();
        assert_eq!(first.update.broker_site_id, "2");
        assert_eq!(first.update.status, QueryStatus::Executing);
        assert!(rx.try_recv().is_err(), "requested tasks are not reported");

        // Same bundle again: no transition, no notification.
        client.inner.apply_bundle(&id, bundle(IN_PROGRESS));
        assert!(rx.try_recv().is_err());

        client.inner.apply_bundle(&id, bundle(COMPLETED));
        let mut statuses: Vec<(String, QueryStatus)> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|n| (n.update.broker_site_id, n.update.status))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            statuses,
            vec![
                ("2".to_string(), QueryStatus::Completed),
                ("3".to_string(), QueryStatus::Failed)
            ]
        );

        assert_eq!(client.get_result_feasibility(&id, "2").unwrap(), 77);
        assert!(client.get_result_feasibility(&id, "3").is_err());
        assert_eq!(client.get_result_site_ids(&id).unwrap(), vec!["2"]);
        assert_eq!(client.get_site_name("3").unwrap(), "Leipzig");
    }

    #[test]
    fn site_without_display_is_named_by_identifier() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let (tx, mut rx) = status_channel();
        client.add_status_listener(tx);
        let id = client.create_query("qry-00000001");

        let anonymous = r#"{"entry": [
            {"resource": {"status": "completed",
                          "owner": {"identifier": {"value": "org.example"}},
                          "output": [{"valueUnsignedInt": 12}]}}
        ]}"#;
        client.inner.apply_bundle(&id, bundle(anonymous));

        assert_eq!(rx.try_recv().unwrap().update.status, QueryStatus::Completed);
        assert_eq!(client.get_result_feasibility(&id, "org.example").unwrap(), 12);
        assert_eq!(client.get_site_name("org.example").unwrap(), "org.example");
    }

    #[test]
    fn identifier_fallback_does_not_replace_a_known_display() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let id = client.create_query("qry-00000001");
        client.inner.apply_bundle(&id, bundle(IN_PROGRESS));

        let without_display = r#"{"entry": [
            {"resource": {"status": "completed",
                          "owner": {"identifier": {"value": "2"}},
                          "output": [{"valueUnsignedInt": 5}]}}
        ]}"#;
        client.inner.apply_bundle(&id, bundle(without_display));
        assert_eq!(client.get_site_name("2").unwrap(), "Erlangen");
    }

    #[test]
    fn polling_continues_while_any_site_is_open() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let id = client.create_query("qry-00000001");

        assert!(client.inner.apply_bundle(&id, bundle(r#"{"entry": []}"#)));
        assert!(client.inner.apply_bundle(&id, bundle(IN_PROGRESS)));
        assert!(!client.inner.apply_bundle(&id, bundle(COMPLETED)));
    }

    #[tokio::test]
    async fn close_drops_definitions() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let id = client.create_query("qry-00000001");
        client.add_query_definition(&id, MediaType::Cql, "library Retrieve").unwrap();
        client.close_query(&id).unwrap();

        assert!(client.inner.queries.get(&id).unwrap().definitions.is_empty());
        assert!(matches!(
            client.publish_query(&id).await,
            Err(BrokerError::PublishFailed { .. })
        ));
    }

    #[test]
    fn closed_query_ignores_bundles() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let (tx, mut rx) = status_channel();
        client.add_status_listener(tx);
        let id = client.create_query("qry-00000001");
        client.close_query(&id).unwrap();

        assert!(!client.inner.apply_bundle(&id, bundle(COMPLETED)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn task_resource_lists_definitions_in_stable_order() {
        let client = DsfBrokerClient::new(DsfBrokerConfig {
            organization_id: "requester.org".into(),
            ..DsfBrokerConfig::default()
        });
        let mut definitions = HashMap::new();
        definitions.insert(MediaType::Cql, "library Retrieve".to_string());
        definitions.insert(MediaType::StructuredQuery, "{}".to_string());

        let task = client.inner.task_resource("qry-00000001", &definitions);
        assert_eq!(task["requester"]["identifier"]["value"], "requester.org");
        assert_eq!(task["businessKey"], "qry-00000001");
        assert_eq!(task["input"][0]["type"]["text"], "application/sq+json");
        assert_eq!(task["input"][1]["type"]["text"], "text/cql");
    }

    #[tokio::test]
    async fn publish_without_definitions_fails() {
        let client = DsfBrokerClient::new(DsfBrokerConfig::default());
        let id = client.create_query("qry-00000001");
        assert!(matches!(
            client.publish_query(&id).await,
            Err(BrokerError::PublishFailed { .. })
        ));
    }
}
