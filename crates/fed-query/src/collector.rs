//! Broker status notifications → durable per-site results.
//!
//! One collector is subscribed to every broker. Intermediate states are only
//! logged. A terminal state resolves the site, builds a result, and stores
//! it; the `(query, site)` uniqueness constraint decides which notification
//! wins, so concurrent deliveries need no in-process locking here.
//! Failures are logged and swallowed: there is no caller to report them to.

use std::sync::Arc;

use fed_broker::{BrokerRegistry, StatusNotification, StatusReceiver};
use fed_core::entities::NewQueryResult;
use fed_core::enums::{QueryStatus, ResultType};
use fed_db::repos::result::SaveOutcome;
use fed_db::service::FedService;
use tokio::task::JoinSet;

use crate::error::QueryResultCollectError;
use crate::results::{ResultLine, ResultService};

/// Status listener shared by all brokers.
#[derive(Clone)]
pub struct QueryStatusCollector {
    service: Arc<FedService>,
    brokers: Arc<BrokerRegistry>,
    results: Arc<ResultService>,
}

impl QueryStatusCollector {
    #[must_use]
    pub const fn new(
        service: Arc<FedService>,
        brokers: Arc<BrokerRegistry>,
        results: Arc<ResultService>,
    ) -> Self {
        Self {
            service,
            brokers,
            results,
        }
    }

    /// Consume the merged status channel until every sender is gone. Each
    /// notification is handled on its own task; in-flight tasks are awaited
    /// before returning.
    pub async fn run(self, mut receiver: StatusReceiver) {
        let mut in_flight = JoinSet::new();
        while let Some(notification) = receiver.recv().await {
            let collector = self.clone();
            in_flight.spawn(async move { collector.on_update(notification).await });
            while in_flight.try_join_next().is_some() {}
        }
        while in_flight.join_next().await.is_some() {}
        tracing::debug!("status channel closed; collector stopped");
    }

    /// Handle one notification. Never fails; problems are logged.
    pub async fn on_update(&self, notification: StatusNotification) {
        if let Err(e) = self.collect(&notification).await {
            tracing::error!(
                query_id = %notification.backend_query_id,
                broker = %notification.update.source,
                site_id = %notification.update.broker_site_id,
                %e,
                "could not record site result"
            );
        }
    }

    async fn collect(
        &self,
        notification: &StatusNotification,
    ) -> Result<(), QueryResultCollectError> {
        let query_id = notification.backend_query_id.as_str();
        let update = &notification.update;

        if !update.status.is_terminal() {
            tracing::debug!(
                query_id,
                broker = %update.source,
                broker_query_id = %update.broker_query_id,
                site_id = %update.broker_site_id,
                status = %update.status,
                "site status changed"
            );
            return Ok(());
        }
        tracing::info!(
            query_id,
            broker = %update.source,
            broker_query_id = %update.broker_query_id,
            site_id = %update.broker_site_id,
            status = %update.status,
            "site finished"
        );

        let broker = self
            .brokers
            .get(update.source)
            .ok_or(QueryResultCollectError::UnknownBroker(update.source))?;

        let count = if update.status == QueryStatus::Completed {
            match broker
                .get_result_feasibility(&update.broker_query_id, &update.broker_site_id)
                .await
            {
                Ok(count) => Some(count),
                Err(e) => {
                    tracing::warn!(query_id, site_id = %update.broker_site_id, %e, "result unavailable; recording failure");
                    None
                }
            }
        } else {
            None
        };

        let site_name = broker.get_site_name(&update.broker_site_id).await?;
        let site = self.service.find_or_create_site(&site_name).await?;
        let new_result = match count {
            Some(count) => NewQueryResult::success(query_id, &site.id, count),
            None => NewQueryResult::error(query_id, &site.id),
        };

        match self.service.save_result(&new_result).await? {
            SaveOutcome::Saved(saved) => {
                let line = match (saved.result_type, saved.result) {
                    (ResultType::Success, Some(count)) => ResultLine::success(site_name, count),
                    _ => ResultLine::error(site_name),
                };
                self.results.add_result_line(query_id, line);
            }
            SaveOutcome::AlreadyExists => {
                tracing::debug!(query_id, site = %site_name, "site result already recorded");
            }
        }
        Ok(())
    }
}
