//! DSF broker task creation and polling against a stub FHIR server.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Reply, StubServer};
use fed_broker::{BrokerClient, DsfBrokerClient, status_channel};
use fed_config::DsfBrokerConfig;
use fed_core::enums::{MediaType, QueryStatus};
use pretty_assertions::assert_eq;

const SITE_TASKS: &str = r#"{
    "resourceType": "Bundle",
    "type": "searchset",
    "entry": [
        {"resource": {"resourceType": "Task", "id": "s2", "status": "completed",
                      "owner": {"identifier": {"value": "2"}, "display": "Erlangen"},
                      "output": [{"type": {"text": "measure-count"}, "valueUnsignedInt": 31}]}},
        {"resource": {"resourceType": "Task", "id": "s3", "status": "rejected",
                      "owner": {"identifier": {"value": "3"}, "display": "Frankfurt"}}}
    ]
}"#;

fn stub_fhir() -> StubServer {
    StubServer::start(|req| {
        if req.method == "POST" && req.url == "/fhir/Task" {
            Reply::status(201, r#"{"resourceType":"Task","id":"task-1"}"#)
        } else if req.method == "GET" && req.url == "/fhir/Task?based-on=Task%2Ftask-1" {
            Reply::ok(SITE_TASKS)
        } else {
            Reply::status(404, "")
        }
    })
}

#[tokio::test]
async fn published_task_is_polled_until_sites_finish() {
    let server = stub_fhir();
    let broker = BrokerClient::from(DsfBrokerClient::new(DsfBrokerConfig {
        base_url: format!("{}/fhir", server.base_url),
        organization_id: "requester.org".into(),
        auth_token: "token".into(),
        poll_interval_secs: 1,
    }));
    let (tx, mut rx) = status_channel();
    broker.add_status_listener(tx);

    let id = broker.create_query("qry-00000001").await.unwrap();
    broker
        .add_query_definition(&id, MediaType::Cql, "library Retrieve")
        .await
        .unwrap();
    broker.publish_query(&id).await.unwrap();

    let mut seen = BTreeMap::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.len() < 2 {
            let n = rx.recv().await.expect("channel open");
            seen.insert(n.update.broker_site_id, n.update.status);
        }
    })
    .await
    .expect("site tasks reported in time");

    assert_eq!(seen.get("2"), Some(&QueryStatus::Completed));
    assert_eq!(seen.get("3"), Some(&QueryStatus::Failed));
    assert_eq!(broker.get_result_feasibility(&id, "2").await.unwrap(), 31);
    assert_eq!(broker.get_site_name("3").await.unwrap(), "Frankfurt");

    let created = &server.requests_to("POST", "/fhir/Task")[0];
    let task: serde_json::Value = serde_json::from_str(&created.body).unwrap();
    assert_eq!(task["resourceType"], "Task");
    assert_eq!(task["input"][0]["valueString"], "library Retrieve");
    assert_eq!(created.authorization.as_deref(), Some("Bearer token"));

    broker.close_query(&id).await.unwrap();
    broker.shutdown();
}

const SITE_TASKS_RUNNING: &str = r#"{
    "resourceType": "Bundle",
    "type": "searchset",
    "entry": [
        {"resource": {"resourceType": "Task", "id": "s2", "status": "in-progress",
                      "owner": {"identifier": {"value": "2"}, "display": "Erlangen"}}},
        {"resource": {"resourceType": "Task", "id": "s3", "status": "requested",
                      "owner": {"identifier": {"value": "3"}, "display": "Frankfurt"}}}
    ]
}"#;

#[tokio::test]
async fn polling_stops_once_every_site_task_is_terminal() {
    // Two polls see running tasks, every later poll sees them finished.
    let polls = Arc::new(AtomicUsize::new(0));
    let seen_polls = Arc::clone(&polls);
    let server = StubServer::start(move |req| {
        if req.method == "POST" && req.url == "/fhir/Task" {
            Reply::status(201, r#"{"resourceType":"Task","id":"task-1"}"#)
        } else if req.method == "GET" && req.url == "/fhir/Task?based-on=Task%2Ftask-1" {
            if seen_polls.fetch_add(1, Ordering::SeqCst) < 2 {
                Reply::ok(SITE_TASKS_RUNNING)
            } else {
                Reply::ok(SITE_TASKS)
            }
        } else {
            Reply::status(404, "")
        }
    });
    let broker = BrokerClient::from(DsfBrokerClient::new(DsfBrokerConfig {
        base_url: format!("{}/fhir", server.base_url),
        organization_id: "requester.org".into(),
        auth_token: String::new(),
        poll_interval_secs: 1,
    }));
    let (tx, mut rx) = status_channel();
    broker.add_status_listener(tx);

    let id = broker.create_query("qry-00000001").await.unwrap();
    broker
        .add_query_definition(&id, MediaType::StructuredQuery, "{}")
        .await
        .unwrap();
    broker.publish_query(&id).await.unwrap();

    // Polls at roughly 0s, 1s and 2s; nothing after the terminal bundle.
    tokio::time::sleep(Duration::from_millis(4300)).await;

    let updates: Vec<(String, QueryStatus)> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|n| (n.update.broker_site_id, n.update.status))
        .collect();
    assert_eq!(
        updates,
        vec![
            ("2".to_string(), QueryStatus::Executing),
            ("2".to_string(), QueryStatus::Completed),
            ("3".to_string(), QueryStatus::Failed),
        ]
    );
    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert_eq!(server.requests_to("GET", "/fhir/Task?based-on=Task%2Ftask-1").len(), 3);

    broker.close_query(&id).await.unwrap();
}
