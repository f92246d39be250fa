//! Polling cache of per-site result lines.
//!
//! Lines are keyed by query id, then site name. The first line for a site
//! wins for as long as it is fresh; an expired line no longer blocks a new
//! one and is excluded from reads. Expiry is checked lazily on access; writes
//! also sweep queries whose lines have all expired, at most once per TTL.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fed_config::ResultsConfig;
use fed_core::enums::ResultType;
use fed_core::obfuscation::QueryResultObfuscator;
use serde::Serialize;

/// One site's answer as held in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    pub site_name: String,
    pub result_type: ResultType,
    pub result: Option<u64>,
    inserted_at: Instant,
}

impl ResultLine {
    #[must_use]
    pub fn success(site_name: impl Into<String>, count: u64) -> Self {
        Self {
            site_name: site_name.into(),
            result_type: ResultType::Success,
            result: Some(count),
            inserted_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn error(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            result_type: ResultType::Error,
            result: None,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Who is reading a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultVisibility {
    /// Real site names.
    Privileged,
    /// Site names replaced by per-query tokens.
    Obfuscated,
}

/// A successful site answer as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteResult {
    pub site_name: String,
    pub result: u64,
}

/// Fresh successful results of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResultSummary {
    pub query_id: String,
    pub total_match_count: u64,
    pub site_count: usize,
    pub results: Vec<SiteResult>,
}

/// TTL-bounded result line cache, safe for concurrent writers and pollers.
#[derive(Debug)]
pub struct ResultService {
    ttl: Duration,
    lines: DashMap<String, Vec<ResultLine>>,
    last_sweep: Mutex<Instant>,
    obfuscator: QueryResultObfuscator,
}

impl ResultService {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            lines: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
            obfuscator: QueryResultObfuscator,
        }
    }

    #[must_use]
    pub fn from_config(config: &ResultsConfig) -> Self {
        Self::new(config.ttl())
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Add a line unless a fresh line for the same site already exists.
    /// Returns whether the line was stored.
    pub fn add_result_line(&self, query_id: &str, line: ResultLine) -> bool {
        self.sweep_expired();
        let mut lines = self.lines.entry(query_id.to_string()).or_default();
        lines.retain(|l| !l.is_expired(self.ttl));
        if lines.iter().any(|l| l.site_name == line.site_name) {
            tracing::debug!(query_id, site = %line.site_name, "result line already cached");
            return false;
        }
        lines.push(line);
        true
    }

    /// Drop queries whose lines have all expired. Runs at most once per TTL
    /// and must not be called while holding a map guard.
    fn sweep_expired(&self) {
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if last.elapsed() < self.ttl {
                return;
            }
            *last = Instant::now();
        }
        let before = self.lines.len();
        self.lines.retain(|_, lines| {
            lines.retain(|l| !l.is_expired(self.ttl));
            !lines.is_empty()
        });
        tracing::debug!(evicted = before.saturating_sub(self.lines.len()), "expired result lines swept");
    }

    /// Fresh `SUCCESS` lines of the query, in insertion order.
    #[must_use]
    pub fn find_successful_by_query(&self, query_id: &str) -> Vec<ResultLine> {
        let fresh: Vec<ResultLine> = self
            .lines
            .get(query_id)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|l| !l.is_expired(self.ttl))
                    .filter(|l| l.result_type == ResultType::Success)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if fresh.is_empty() {
            self.lines
                .remove_if(query_id, |_, lines| lines.iter().all(|l| l.is_expired(self.ttl)));
        }
        fresh
    }

    /// Number of fresh lines of either type, i.e. sites that have answered.
    #[must_use]
    pub fn answered_site_count(&self, query_id: &str) -> usize {
        self.lines.get(query_id).map_or(0, |lines| {
            lines.iter().filter(|l| !l.is_expired(self.ttl)).count()
        })
    }

    /// Successful results with site names as `visibility` allows.
    #[must_use]
    pub fn snapshot(&self, query_id: &str, visibility: ResultVisibility) -> QueryResultSummary {
        let mut results: Vec<SiteResult> = self
            .find_successful_by_query(query_id)
            .into_iter()
            .map(|line| SiteResult {
                site_name: match visibility {
                    ResultVisibility::Privileged => line.site_name,
                    ResultVisibility::Obfuscated => {
                        self.obfuscator.tokenize_site_name(query_id, &line.site_name)
                    }
                },
                result: line.result.unwrap_or_default(),
            })
            .collect();
        results.sort_by(|a, b| a.site_name.cmp(&b.site_name));

        QueryResultSummary {
            query_id: query_id.to_string(),
            total_match_count: results.iter().map(|r| r.result).sum(),
            site_count: results.len(),
            results,
        }
    }
}
