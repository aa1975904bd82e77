//! Search query representation.

use serde::{Deserialize, Serialize};

use crate::{Result, SearchError};

/// Default number of results requested per engine.
pub const DEFAULT_LIMIT: usize = 10;

/// A search query with all parameters.
///
/// Built once with the `with_*` methods and then shared read-only between
/// workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The search terms.
    pub text: String,
    /// Page number (1-indexed).
    pub page: u32,
    /// Maximum results wanted from each engine.
    pub limit: usize,
    /// Language/locale (e.g., "en-US").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Region code (e.g., "us").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl SearchQuery {
    /// Creates a new search query with the given terms.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: 1,
            limit: DEFAULT_LIMIT,
            language: None,
            region: None,
        }
    }

    /// Sets the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the per-engine result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the language/locale.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Checks the query before it is dispatched.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(SearchError::InvalidQuery("Query cannot be empty".into()));
        }
        if self.page == 0 {
            return Err(SearchError::InvalidQuery("Page must be at least 1".into()));
        }
        if self.limit == 0 {
            return Err(SearchError::InvalidQuery(
                "Limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
