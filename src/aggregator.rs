//! Result aggregation and cross-engine deduplication.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tracing::debug;

use crate::result::{
    AggregatedResponse, EngineOutcome, EngineResults, ResponseMetadata, SearchResult,
    NO_RESULTS_MESSAGE,
};

/// Instance identifier used when none is configured.
pub const DEFAULT_INSTANCE_ID: &str = "default";

/// Merges per-engine outcomes into one response.
#[derive(Debug, Clone)]
pub struct Aggregator {
    /// Compare URLs without scheme, trailing slash and case.
    normalize_urls: bool,
    /// Reported in response metadata.
    instance_id: String,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            normalize_urls: false,
            instance_id: DEFAULT_INSTANCE_ID.to_string(),
        }
    }
}

impl Aggregator {
    /// Creates a new aggregator with exact URL matching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables URL normalization for deduplication.
    pub fn with_normalized_urls(mut self, normalize: bool) -> Self {
        self.normalize_urls = normalize;
        self
    }

    /// Sets the instance id reported in metadata.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Returns the instance id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Merges outcomes into an [`AggregatedResponse`].
    ///
    /// `order` lists outcome keys in caller order. The combined list walks
    /// outcomes in that order and each outcome's results in engine order,
    /// keeping the first occurrence of every URL. Outcomes whose key is not
    /// in `order` follow in key order.
    pub fn merge(
        &self,
        mut outcomes: HashMap<String, EngineOutcome>,
        order: &[String],
        query: &str,
    ) -> AggregatedResponse {
        let mut ordered: Vec<EngineOutcome> = order
            .iter()
            .filter_map(|key| outcomes.remove(key))
            .collect();
        let mut rest: Vec<EngineOutcome> = outcomes.into_values().collect();
        rest.sort_by(|a, b| a.key.cmp(&b.key));
        ordered.extend(rest);

        let mut seen: HashSet<String> = HashSet::new();
        let mut combined: Vec<SearchResult> = Vec::new();
        let mut per_engine = Vec::with_capacity(ordered.len());
        let mut errors = BTreeMap::new();
        let mut engines: Vec<String> = Vec::new();

        for outcome in ordered {
            if outcome.dispatched && !engines.contains(&outcome.engine) {
                engines.push(outcome.engine.clone());
            }

            let error = outcome.error.as_ref().map(ToString::to_string);
            if let Some(message) = &error {
                errors.insert(outcome.key.clone(), message.clone());
            }

            for result in &outcome.results {
                if seen.insert(self.dedup_key(result)) {
                    combined.push(result.clone());
                }
            }

            per_engine.push(EngineResults {
                count: outcome.results.len(),
                elapsed_ms: outcome.elapsed.as_millis() as u64,
                key: outcome.key,
                engine: outcome.engine,
                results: outcome.results,
                error,
            });
        }

        debug!(
            engines = per_engine.len(),
            combined = combined.len(),
            failed = errors.len(),
            "Merged engine results"
        );

        let error = combined.is_empty().then(|| NO_RESULTS_MESSAGE.to_string());
        AggregatedResponse {
            query: query.to_string(),
            per_engine,
            total_count: combined.len(),
            combined,
            metadata: ResponseMetadata {
                timestamp: Utc::now(),
                instance_id: self.instance_id.clone(),
                engines,
                errors,
                error,
                duration_ms: 0,
            },
        }
    }

    fn dedup_key(&self, result: &SearchResult) -> String {
        if self.normalize_urls {
            result.normalized_url()
        } else {
            result.url.clone()
        }
    }
}
