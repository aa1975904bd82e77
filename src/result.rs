//! Search result types.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SearchError;

/// Placeholder used when an engine hands back a result without a title.
pub const MISSING_TITLE: &str = "No title";

/// Placeholder used when an engine hands back a result without a snippet.
pub const MISSING_SNIPPET: &str = "No description";

/// Message carried by a response in which no engine produced anything.
pub const NO_RESULTS_MESSAGE: &str = "No results from any search engine";

/// A single search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Result URL. Identifies the result across engines.
    pub url: String,
    /// Result description/snippet.
    pub snippet: String,
}

impl SearchResult {
    /// Creates a new search result.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }

    /// Returns a normalized URL for deduplication (without scheme and trailing slash).
    pub fn normalized_url(&self) -> String {
        let url = self
            .url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        url.to_lowercase()
    }
}

/// Turns raw engine output into clean results.
///
/// Entries without a URL are dropped, blank titles and snippets get
/// placeholders, repeated URLs within the same engine are dropped when
/// `ignore_duplicates` is set, and the list is cut to `max_results`.
pub fn normalize_results(
    raw: Vec<SearchResult>,
    max_results: usize,
    ignore_duplicates: bool,
) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(raw.len().min(max_results));

    for mut result in raw {
        if results.len() >= max_results {
            break;
        }

        let url = result.url.trim();
        if url.is_empty() {
            continue;
        }
        if url.len() != result.url.len() {
            result.url = url.to_string();
        }
        if ignore_duplicates && !seen.insert(result.url.clone()) {
            continue;
        }

        if result.title.trim().is_empty() {
            result.title = MISSING_TITLE.to_string();
        }
        if result.snippet.trim().is_empty() {
            result.snippet = MISSING_SNIPPET.to_string();
        }
        results.push(result);
    }

    results
}

/// What one worker produced for one task.
#[derive(Debug)]
pub struct EngineOutcome {
    /// Slot in the outcome map (engine name, or sub-query key).
    pub key: String,
    /// Engine that served the task.
    pub engine: String,
    /// Normalized results; empty when the task failed.
    pub results: Vec<SearchResult>,
    /// Failure, if the task did not succeed.
    pub error: Option<SearchError>,
    /// Wall-clock time spent on the engine call.
    pub elapsed: Duration,
    /// Whether a worker picked the task up. False for tasks the deadline
    /// cut off before they started.
    pub dispatched: bool,
}

impl EngineOutcome {
    /// A successful outcome.
    pub fn success(
        key: impl Into<String>,
        engine: impl Into<String>,
        results: Vec<SearchResult>,
        elapsed: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            engine: engine.into(),
            results,
            error: None,
            elapsed,
            dispatched: true,
        }
    }

    /// A failed outcome.
    pub fn failure(
        key: impl Into<String>,
        engine: impl Into<String>,
        error: SearchError,
        elapsed: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            engine: engine.into(),
            results: Vec::new(),
            error: Some(error),
            elapsed,
            dispatched: true,
        }
    }

    /// A task that was still queued when the deadline expired.
    pub fn not_started(key: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            dispatched: false,
            ..Self::failure(key, engine, SearchError::DeadlineExceeded, Duration::ZERO)
        }
    }

    /// Whether the task failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Results of one engine (or sub-query) inside an aggregated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResults {
    /// Outcome key.
    pub key: String,
    /// Engine name.
    pub engine: String,
    /// Results in engine order.
    pub results: Vec<SearchResult>,
    /// Number of results.
    pub count: usize,
    /// Time the engine call took, in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,
    /// Failure message, if the engine failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata attached to every aggregated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// When the response was built.
    pub timestamp: DateTime<Utc>,
    /// Identifier of the service instance that answered.
    pub instance_id: String,
    /// Engines a request was actually sent to, in caller order. Engines
    /// whose tasks never started before the deadline are left out.
    pub engines: Vec<String>,
    /// Failure message per outcome key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    /// Set when the response is the designated empty response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent on the whole call in milliseconds.
    pub duration_ms: u64,
}

/// Unified response of one orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// Query text the response answers.
    pub query: String,
    /// Per-engine breakdown.
    pub per_engine: Vec<EngineResults>,
    /// Cross-engine results, unique by URL.
    pub combined: Vec<SearchResult>,
    /// Length of `combined`.
    pub total_count: usize,
    /// Response metadata.
    pub metadata: ResponseMetadata,
}

impl AggregatedResponse {
    /// Whether this is the "nothing from anyone" response.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Sets the call duration.
    pub fn set_duration(&mut self, duration_ms: u64) {
        self.metadata.duration_ms = duration_ms;
    }
}
