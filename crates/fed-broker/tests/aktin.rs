//! Aktin broker REST surface and event stream against a stub broker.

mod common;

use std::time::Duration;

use common::{Reply, StubServer};
use fed_broker::{AktinBrokerClient, BrokerClient, BrokerError, status_channel};
use fed_config::AktinBrokerConfig;
use fed_core::enums::{MediaType, QueryStatus};
use pretty_assertions::assert_eq;

const EVENT: &str = r#"{"request":"17","node":"3","status":"completed"}"#;

fn stub_broker() -> StubServer {
    StubServer::start(|req| match (req.method.as_str(), req.url.as_str()) {
        ("POST", "/broker/request") => {
            Reply::status(201, "").header("Location", "http://broker/broker/request/17")
        }
        ("PUT", "/broker/request/17")
        | ("POST", "/broker/request/17/publish")
        | ("POST", "/broker/request/17/closed") => Reply::status(204, ""),
        ("GET", "/broker/request/17/status") => Reply::ok(
            r#"[{"node":"2","status":"processing"},{"node":"3","status":"completed"}]"#,
        ),
        ("GET", "/broker/request/17/result/3") => Reply::ok("128"),
        ("GET", "/broker/node/3") => {
            Reply::ok(r#"{"id":"3","clientDN":"CN=Uniklinik Leipzig,O=UKL,C=DE"}"#)
        }
        ("GET", "/broker/events") => Reply::ok(format!(": hello\n\ndata: {EVENT}\n\n"))
            .header("Content-Type", "text/event-stream"),
        _ => Reply::status(404, "not found"),
    })
}

fn config(server: &StubServer) -> AktinBrokerConfig {
    AktinBrokerConfig {
        base_url: server.base_url.clone(),
        api_key: "xxxApiKey123".into(),
        reconnect_secs: 1,
    }
}

#[tokio::test]
async fn request_lifecycle_over_rest() {
    let server = stub_broker();
    let broker = BrokerClient::from(AktinBrokerClient::new(config(&server)));

    let id = broker.create_query("qry-00000001").await.unwrap();
    assert_eq!(id, "17");
    broker
        .add_query_definition(&id, MediaType::Cql, "library Retrieve")
        .await
        .unwrap();
    broker.publish_query(&id).await.unwrap();

    assert_eq!(broker.get_result_site_ids(&id).await.unwrap(), vec!["3"]);
    assert_eq!(broker.get_result_feasibility(&id, "3").await.unwrap(), 128);
    assert_eq!(broker.get_site_name("3").await.unwrap(), "Uniklinik Leipzig");
    // Cached after the first lookup.
    assert_eq!(broker.get_site_name("3").await.unwrap(), "Uniklinik Leipzig");
    assert_eq!(server.requests_to("GET", "/broker/node/3").len(), 1);

    broker.close_query(&id).await.unwrap();

    let put = &server.requests_to("PUT", "/broker/request/17")[0];
    assert_eq!(put.body, "library Retrieve");
    assert_eq!(put.content_type.as_deref(), Some("text/cql"));
    assert!(
        server
            .requests()
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer xxxApiKey123"))
    );
}

#[tokio::test]
async fn only_cql_definitions_are_accepted() {
    let server = stub_broker();
    let broker = BrokerClient::from(AktinBrokerClient::new(config(&server)));
    let id = broker.create_query("qry-00000001").await.unwrap();

    let err = broker
        .add_query_definition(&id, MediaType::StructuredQuery, "{}")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::UnsupportedMediaType { .. }));
}

#[tokio::test]
async fn missing_result_maps_to_site_not_found() {
    let server = stub_broker();
    let broker = BrokerClient::from(AktinBrokerClient::new(config(&server)));
    let id = broker.create_query("qry-00000001").await.unwrap();

    assert!(matches!(
        broker.get_result_feasibility(&id, "2").await,
        Err(BrokerError::SiteNotFound(_))
    ));
}

#[tokio::test]
async fn publish_rejection_is_publish_failed() {
    let server = StubServer::start(|req| match (req.method.as_str(), req.url.as_str()) {
        ("POST", "/broker/request") => {
            Reply::status(201, "").header("Location", "/broker/request/5")
        }
        _ => Reply::status(503, "maintenance"),
    });
    let broker = BrokerClient::from(AktinBrokerClient::new(config(&server)));
    let id = broker.create_query("qry-00000001").await.unwrap();

    assert!(matches!(
        broker.publish_query(&id).await,
        Err(BrokerError::PublishFailed { .. })
    ));
}

#[tokio::test]
async fn event_stream_delivers_and_reconnects() {
    let server = stub_broker();
    let client = AktinBrokerClient::new(config(&server));
    let (tx, mut rx) = status_channel();
    client.add_status_listener(tx);
    let broker = BrokerClient::from(client.clone());
    broker.create_query("qry-00000001").await.unwrap();

    client.start_event_stream();
    // The stub ends the stream after one event; the second delivery comes
    // from the reconnected stream.
    for _ in 0..2 {
        let n = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        assert_eq!(n.backend_query_id, "qry-00000001");
        assert_eq!(n.update.broker_site_id, "3");
        assert_eq!(n.update.status, QueryStatus::Completed);
    }
    broker.shutdown();
    assert!(server.requests_to("GET", "/broker/events").len() >= 2);
}
