//! Status notifications flowing from brokers to the result collector.
//!
//! Every broker owns a [`StatusFanout`] holding the senders registered via
//! `add_status_listener`. Notifications are already resolved to the backend
//! query id, since broker-local ids mean nothing outside the broker.

use std::sync::{Mutex, PoisonError};

use fed_core::enums::{BrokerType, QueryStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A status transition of one query at one site, as observed by a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStatusUpdate {
    pub source: BrokerType,
    pub broker_query_id: String,
    pub broker_site_id: String,
    pub status: QueryStatus,
}

/// Envelope carried on the status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    pub backend_query_id: String,
    pub update: QueryStatusUpdate,
}

pub type StatusSender = mpsc::UnboundedSender<StatusNotification>;
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusNotification>;

/// Create a status channel. Clone the sender into as many brokers as needed;
/// the receiver sees the merged stream.
#[must_use]
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    mpsc::unbounded_channel()
}

/// Registered listeners of one broker.
#[derive(Debug, Default)]
pub struct StatusFanout {
    listeners: Mutex<Vec<StatusSender>>,
}

impl StatusFanout {
    pub fn add(&self, listener: StatusSender) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every listener. Receivers see the channel close once no other
    /// sender is left.
    pub fn clear(&self) {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Deliver `update` to every live listener. Listeners whose receiver was
    /// dropped are unregistered.
    pub fn notify(&self, backend_query_id: &str, update: QueryStatusUpdate) {
        tracing::debug!(
            broker = %update.source,
            backend_query_id,
            broker_query_id = %update.broker_query_id,
            site_id = %update.broker_site_id,
            status = %update.status,
            "broker status update"
        );
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|listener| {
            listener
                .send(StatusNotification {
                    backend_query_id: backend_query_id.to_string(),
                    update: update.clone(),
                })
                .is_ok()
        });
    }
}
