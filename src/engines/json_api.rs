//! Engine adapter for backends that answer with JSON.
//!
//! The request URL comes from a template with `{query}`, `{page}`, `{limit}`
//! and `{language}` placeholders. Results are read from the array found at
//! `results_pointer` (a JSON pointer, empty for the document root), and each
//! field is either a plain key or a JSON pointer relative to the item.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{ClientCache, RequestOptions};
use crate::{Engine, EngineConfig, Result, SearchError, SearchQuery, SearchResult};

/// Definition of a JSON API engine, as found in the `engines` config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonApiConfig {
    /// Engine identifier.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// URL template.
    pub url: String,
    /// JSON pointer to the result array.
    #[serde(default)]
    pub results_pointer: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default = "default_url_field")]
    pub url_field: String,
    #[serde(default = "default_snippet_field")]
    pub snippet_field: String,
    /// Prefix for relative result URLs (e.g. `https://en.wikipedia.org/wiki/`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
    /// Substituted for `{language}` when the query has none.
    #[serde(default = "default_language")]
    pub language: String,
    /// Remove markup from snippets.
    #[serde(default = "default_true")]
    pub strip_html: bool,
    /// Extra request headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_title_field() -> String {
    "title".to_string()
}

fn default_url_field() -> String {
    "url".to_string()
}

fn default_snippet_field() -> String {
    "snippet".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl JsonApiConfig {
    /// Creates a definition with default field names.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            enabled: true,
            url: url.into(),
            results_pointer: String::new(),
            title_field: default_title_field(),
            url_field: default_url_field(),
            snippet_field: default_snippet_field(),
            url_prefix: None,
            language: default_language(),
            strip_html: true,
            headers: HashMap::new(),
        }
    }
}

/// Generic JSON search engine.
pub struct JsonApiEngine {
    config: EngineConfig,
    api: JsonApiConfig,
    clients: ClientCache,
}

impl JsonApiEngine {
    /// Creates an engine from its definition.
    pub fn new(api: JsonApiConfig) -> Self {
        let config = EngineConfig {
            name: api.name.clone(),
            aliases: api.aliases.clone(),
            enabled: api.enabled,
            paging: api.url.contains("{page}"),
        };
        Self {
            config,
            api,
            clients: ClientCache::new(),
        }
    }

    /// MediaWiki full-text search for the given language edition.
    pub fn wikipedia(language: &str) -> Self {
        let mut api = JsonApiConfig::new(
            "wikipedia",
            format!(
                "https://{language}.wikipedia.org/w/api.php?action=query&list=search&format=json&srsearch={{query}}&srlimit={{limit}}"
            ),
        );
        api.aliases = vec!["wiki".to_string()];
        api.results_pointer = "/query/search".to_string();
        api.url_field = "title".to_string();
        api.url_prefix = Some(format!("https://{language}.wikipedia.org/wiki/"));
        Self::new(api)
    }

    /// Returns the engine definition.
    pub fn api(&self) -> &JsonApiConfig {
        &self.api
    }

    /// Expands the URL template for a query.
    pub fn request_url(&self, query: &SearchQuery) -> Result<url::Url> {
        let language = query.language.as_deref().unwrap_or(&self.api.language);
        let expanded = self
            .api
            .url
            .replace("{query}", &urlencoding::encode(&query.text))
            .replace("{page}", &query.page.to_string())
            .replace("{limit}", &query.limit.to_string())
            .replace("{language}", &urlencoding::encode(language));
        Ok(url::Url::parse(&expanded)?)
    }

    /// Extracts results from a response document.
    pub fn parse_results(&self, body: &Value) -> Result<Vec<SearchResult>> {
        let items = body
            .pointer(&self.api.results_pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SearchError::Parse(format!(
                    "{}: no result array at '{}'",
                    self.config.name, self.api.results_pointer
                ))
            })?;

        let results = items
            .iter()
            .map(|item| {
                let title = field(item, &self.api.title_field);
                let mut url = field(item, &self.api.url_field);
                if let Some(prefix) = &self.api.url_prefix {
                    if !url.is_empty() && !url.starts_with("http") {
                        url = format!("{}{}", prefix, url.replace(' ', "_"));
                    }
                }
                let mut snippet = field(item, &self.api.snippet_field);
                if self.api.strip_html {
                    snippet = strip_html_tags(&snippet);
                }
                SearchResult::new(title, url, snippet)
            })
            .collect();

        Ok(results)
    }
}

/// Reads a string field by key or, when it starts with `/`, by pointer.
fn field(item: &Value, name: &str) -> String {
    let value = if name.starts_with('/') {
        item.pointer(name)
    } else {
        item.get(name)
    };
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn strip_html_tags(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
}

#[async_trait]
impl Engine for JsonApiEngine {
    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn search(&self, query: &SearchQuery, options: &RequestOptions) -> Result<Vec<SearchResult>> {
        let url = self.request_url(query)?;
        debug!(engine = %self.config.name, %url, "Requesting JSON API");

        let client = self.clients.get(options)?;
        let mut request = client.get(url).timeout(options.timeout);
        for (name, value) in &self.api.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(SearchError::EmptyResponse(self.config.name.clone()));
        }

        let document: Value = serde_json::from_str(&body)
            .map_err(|e| SearchError::Parse(format!("{}: {}", self.config.name, e)))?;
        self.parse_results(&document)
    }
}
