//! # fed-broker
//!
//! Broker protocol clients for federated feasibility queries.
//!
//! A broker carries a published query to its sites and reports per-site
//! status changes back over a channel. Variants:
//! - `mock`: in-process simulation of a fixed site set
//! - `direct`: one synchronous HTTP evaluation endpoint
//! - `aktin`: REST plus a server-sent event stream
//! - `dsf`: FHIR `Task` resources, polled
//!
//! [`BrokerClient`] is the tagged union used by the dispatcher and the
//! collector; [`BrokerRegistry`] assembles the enabled set from configuration.

pub mod aktin;
pub mod direct;
pub mod dsf;
pub mod mock;
pub mod status;

mod error;
mod http;
mod registry;

pub use aktin::AktinBrokerClient;
pub use direct::DirectBrokerClient;
pub use dsf::DsfBrokerClient;
pub use error::BrokerError;
pub use mock::MockBrokerClient;
pub use registry::BrokerRegistry;
pub use status::{
    QueryStatusUpdate, StatusNotification, StatusReceiver, StatusSender, status_channel,
};

use fed_core::enums::{BrokerType, MediaType};

// ── Client ─────────────────────────────────────────────────────────

/// One configured broker.
#[derive(Debug)]
pub enum BrokerClient {
    Mock(MockBrokerClient),
    Direct(DirectBrokerClient),
    Aktin(AktinBrokerClient),
    Dsf(DsfBrokerClient),
}

impl BrokerClient {
    #[must_use]
    pub const fn broker_type(&self) -> BrokerType {
        match self {
            Self::Mock(_) => BrokerType::Mock,
            Self::Direct(_) => BrokerType::Direct,
            Self::Aktin(_) => BrokerType::Aktin,
            Self::Dsf(_) => BrokerType::Dsf,
        }
    }

    /// Register a status listener. Every transition observed afterwards is
    /// sent to it, including transitions seen after a transport reconnect.
    pub fn add_status_listener(&self, listener: StatusSender) {
        match self {
            Self::Mock(c) => c.add_status_listener(listener),
            Self::Direct(c) => c.add_status_listener(listener),
            Self::Aktin(c) => c.add_status_listener(listener),
            Self::Dsf(c) => c.add_status_listener(listener),
        }
    }

    /// Allocate a broker-local query id mapped to `backend_query_id`.
    pub async fn create_query(&self, backend_query_id: &str) -> Result<String, BrokerError> {
        match self {
            Self::Mock(c) => Ok(c.create_query(backend_query_id)),
            Self::Direct(c) => Ok(c.create_query(backend_query_id)),
            Self::Aktin(c) => c.create_query(backend_query_id).await,
            Self::Dsf(c) => Ok(c.create_query(backend_query_id)),
        }
    }

    /// Attach one serialized representation before publishing.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::QueryNotFound`] for an unknown id and
    /// [`BrokerError::UnsupportedMediaType`] when the broker cannot carry
    /// `media_type`.
    pub async fn add_query_definition(
        &self,
        broker_query_id: &str,
        media_type: MediaType,
        content: &str,
    ) -> Result<(), BrokerError> {
        match self {
            Self::Mock(c) => c.add_query_definition(broker_query_id, media_type, content),
            Self::Direct(c) => c.add_query_definition(broker_query_id, media_type, content),
            Self::Aktin(c) => {
                c.add_query_definition(broker_query_id, media_type, content)
                    .await
            }
            Self::Dsf(c) => c.add_query_definition(broker_query_id, media_type, content),
        }
    }

    /// Broadcast the query. Status notifications start after this returns
    /// (or, for the direct broker, before it returns).
    pub async fn publish_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        match self {
            Self::Mock(c) => c.publish_query(broker_query_id),
            Self::Direct(c) => c.publish_query(broker_query_id).await,
            Self::Aktin(c) => c.publish_query(broker_query_id).await,
            Self::Dsf(c) => c.publish_query(broker_query_id).await,
        }
    }

    /// Mark the query closed and cancel outstanding per-site work. No
    /// notification for the query is sent once this returns.
    pub async fn close_query(&self, broker_query_id: &str) -> Result<(), BrokerError> {
        match self {
            Self::Mock(c) => c.close_query(broker_query_id),
            Self::Direct(c) => c.close_query(broker_query_id),
            Self::Aktin(c) => c.close_query(broker_query_id).await,
            Self::Dsf(c) => c.close_query(broker_query_id),
        }
    }

    /// Match count reported by `site_id`.
    pub async fn get_result_feasibility(
        &self,
        broker_query_id: &str,
        site_id: &str,
    ) -> Result<u64, BrokerError> {
        match self {
            Self::Mock(c) => c.get_result_feasibility(broker_query_id, site_id),
            Self::Direct(c) => c.get_result_feasibility(broker_query_id, site_id),
            Self::Aktin(c) => c.get_result_feasibility(broker_query_id, site_id).await,
            Self::Dsf(c) => c.get_result_feasibility(broker_query_id, site_id),
        }
    }

    /// Sites that have a result for the query.
    pub async fn get_result_site_ids(
        &self,
        broker_query_id: &str,
    ) -> Result<Vec<String>, BrokerError> {
        match self {
            Self::Mock(c) => c.get_result_site_ids(broker_query_id),
            Self::Direct(c) => c.get_result_site_ids(broker_query_id),
            Self::Aktin(c) => c.get_result_site_ids(broker_query_id).await,
            Self::Dsf(c) => c.get_result_site_ids(broker_query_id),
        }
    }

    pub async fn get_site_name(&self, site_id: &str) -> Result<String, BrokerError> {
        match self {
            Self::Mock(c) => c.get_site_name(site_id),
            Self::Direct(c) => c.get_site_name(site_id),
            Self::Aktin(c) => c.get_site_name(site_id).await,
            Self::Dsf(c) => c.get_site_name(site_id),
        }
    }

    /// Stop background push and poll loops and release status listeners.
    pub fn shutdown(&self) {
        match self {
            Self::Mock(c) => c.shutdown(),
            Self::Direct(c) => c.shutdown(),
            Self::Aktin(c) => c.shutdown(),
            Self::Dsf(c) => c.shutdown(),
        }
    }
}

impl From<MockBrokerClient> for BrokerClient {
    fn from(client: MockBrokerClient) -> Self {
        Self::Mock(client)
    }
}

impl From<DirectBrokerClient> for BrokerClient {
    fn from(client: DirectBrokerClient) -> Self {
        Self::Direct(client)
    }
}

impl From<AktinBrokerClient> for BrokerClient {
    fn from(client: AktinBrokerClient) -> Self {
        Self::Aktin(client)
    }
}

impl From<DsfBrokerClient> for BrokerClient {
    fn from(client: DsfBrokerClient) -> Self {
        Self::Dsf(client)
    }
}
