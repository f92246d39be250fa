use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use fed_broker::BrokerRegistry;
use fed_config::FedConfig;
use fed_core::entities::BrokerDispatch;
use fed_core::enums::{BrokerType, MediaType};
use fed_db::service::FedService;
use fed_query::{
    PassthroughTranslator, QueryDispatcher, QueryResultSummary, QueryStatusCollector,
    ResultService, ResultVisibility,
};
use serde::Serialize;

use crate::cli::{GlobalFlags, SubmitArgs};
use crate::output::output;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How long pending result writes may take after the brokers shut down.
const COLLECTOR_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub brokers: Vec<BrokerType>,
    pub answered_sites: usize,
    pub expected_sites: Option<usize>,
    #[serde(flatten)]
    pub summary: QueryResultSummary,
}

pub async fn handle(
    args: &SubmitArgs,
    flags: &GlobalFlags,
    config: &FedConfig,
) -> anyhow::Result<()> {
    let response = execute(args, config).await?;
    if !flags.quiet
        && response
            .expected_sites
            .is_some_and(|expected| response.answered_sites < expected)
    {
        eprintln!(
            "waited {}s; {} of {} sites answered",
            args.wait,
            response.answered_sites,
            response.expected_sites.unwrap_or_default()
        );
    }
    output(&response, flags.format)
}

/// Enqueue, dispatch, and poll until every expected site answered or the
/// wait expires. Open broker queries are closed before returning.
pub async fn execute(args: &SubmitArgs, config: &FedConfig) -> anyhow::Result<SubmitResponse> {
    config.validate()?;
    let query = super::read_query(&args.file)?;

    let mut translator = PassthroughTranslator::new();
    if let Some(path) = &args.cql {
        let cql = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read CQL file {}", path.display()))?;
        translator = translator.with_representation(MediaType::Cql, cql);
    }

    let service = Arc::new(
        FedService::new_local(&config.database.path)
            .await
            .context("failed to open database")?,
    );
    let brokers = Arc::new(BrokerRegistry::from_config(&config.brokers)?);
    let results = Arc::new(ResultService::from_config(&config.results));

    let collector = QueryStatusCollector::new(
        Arc::clone(&service),
        Arc::clone(&brokers),
        Arc::clone(&results),
    );
    let collector_task = tokio::spawn(collector.run(brokers.subscribe()));

    let dispatcher = QueryDispatcher::new(Arc::clone(&service), Arc::clone(&brokers), translator)
        .with_policy(config.dispatch.policy);
    let query_id = dispatcher.enqueue(&query, &args.created_by).await?;
    let dispatches = dispatcher.dispatch(&query_id).await?;

    let expected_sites = expected_site_count(config, &dispatches);
    let deadline = Instant::now() + Duration::from_secs(args.wait);
    loop {
        let answered = results.answered_site_count(&query_id);
        if expected_sites.is_some_and(|expected| answered >= expected)
            || Instant::now() >= deadline
        {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    for dispatch in &dispatches {
        if let Some(broker) = brokers.get(dispatch.broker_type) {
            if let Err(error) = broker.close_query(&dispatch.broker_query_id).await {
                tracing::warn!(broker = %dispatch.broker_type, %error, "failed to close broker query");
            }
        }
    }
    // Releasing the brokers' listeners closes the channel; the collector then
    // finishes its in-flight writes.
    brokers.shutdown_all();
    let abort = collector_task.abort_handle();
    if tokio::time::timeout(COLLECTOR_DRAIN, collector_task).await.is_err() {
        tracing::warn!(query_id = %query_id, "collector did not drain in time");
        abort.abort();
    }

    let visibility = if args.obfuscate {
        ResultVisibility::Obfuscated
    } else {
        ResultVisibility::Privileged
    };
    Ok(SubmitResponse {
        answered_sites: results.answered_site_count(&query_id),
        brokers: dispatches.iter().map(|d| d.broker_type).collect(),
        expected_sites,
        summary: results.snapshot(&query_id, visibility),
    })
}

/// Number of sites that will answer, when every dispatched broker has a
/// fixed site set. Remote federations report sites as they go.
fn expected_site_count(config: &FedConfig, dispatches: &[BrokerDispatch]) -> Option<usize> {
    dispatches
        .iter()
        .map(|d| match d.broker_type {
            BrokerType::Mock => Some(config.brokers.mock.site_ids.len()),
            BrokerType::Direct => Some(1),
            BrokerType::Aktin | BrokerType::Dsf => None,
        })
        .sum()
}
