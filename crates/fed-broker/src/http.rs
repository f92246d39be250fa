//! Response handling shared by the remote broker clients.
//!
//! An overloaded broker answers 429 or 503, usually with `Retry-After` given
//! either in seconds or as an HTTP date. Any other non-success status is a
//! rejection. FHIR servers explain rejections in an `OperationOutcome`; its
//! diagnostics are kept instead of the raw body.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;

use crate::error::BrokerError;

/// Wait suggested to callers when a busy broker gives no usable hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
/// Error pages beyond this many characters are cut.
const MAX_REJECTION_CHARS: usize = 512;

/// Pass a successful response through; turn anything else into
/// [`BrokerError::Busy`] or [`BrokerError::Rejected`].
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, BrokerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(BrokerError::Busy {
            status: status.as_u16(),
            retry_after_secs: retry_after_secs(resp.headers(), Utc::now()),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BrokerError::Rejected {
        status: status.as_u16(),
        message: rejection_message(&body),
    })
}

fn retry_after_secs(headers: &HeaderMap, now: DateTime<Utc>) -> u64 {
    let Some(value) = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok()) else {
        return DEFAULT_RETRY_AFTER_SECS;
    };
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return secs;
    }
    DateTime::parse_from_rfc2822(value).map_or(DEFAULT_RETRY_AFTER_SECS, |at| {
        u64::try_from((at.with_timezone(&Utc) - now).num_seconds()).unwrap_or(0)
    })
}

#[derive(Debug, Deserialize)]
struct OperationOutcome {
    #[serde(rename = "resourceType")]
    resource_type: String,
    #[serde(default)]
    issue: Vec<OutcomeIssue>,
}

#[derive(Debug, Deserialize)]
struct OutcomeIssue {
    diagnostics: Option<String>,
    details: Option<OutcomeDetails>,
}

#[derive(Debug, Deserialize)]
struct OutcomeDetails {
    text: Option<String>,
}

fn rejection_message(body: &str) -> String {
    if let Ok(outcome) = serde_json::from_str::<OperationOutcome>(body) {
        if outcome.resource_type == "OperationOutcome" {
            let issues: Vec<String> = outcome
                .issue
                .into_iter()
                .filter_map(|issue| issue.diagnostics.or_else(|| issue.details?.text))
                .collect();
            if !issues.is_empty() {
                return issues.join("; ");
            }
        }
    }

    let body = body.trim();
    match body.char_indices().nth(MAX_REJECTION_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Parse a plain-text match count such as `"42\n"`.
pub fn parse_count(body: &str) -> Result<u64, BrokerError> {
    body.trim()
        .parse::<u64>()
        .map_err(|e| BrokerError::Parse(format!("expected a match count, got '{}': {e}", body.trim())))
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
