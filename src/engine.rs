//! Search engine traits and configuration.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use serde::{Deserialize, Serialize};

use crate::{Result, SearchError, SearchQuery, SearchResult};

/// Configuration for a search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identifier used in engine lists (e.g., "duckduckgo").
    pub name: String,
    /// Alternative identifiers accepted for this engine (e.g., "ddg").
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Whether the engine is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether pagination is supported.
    #[serde(default)]
    pub paging: bool,
}

fn default_enabled() -> bool {
    true
}

impl EngineConfig {
    /// Creates an enabled configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            aliases: Vec::new(),
            enabled: true,
            paging: false,
        }
    }
}

/// Per-request settings handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Proxy URL to route the request through.
    pub proxy: Option<String>,
    /// Upper bound for the whole request.
    pub timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl RequestOptions {
    /// Builds a reqwest client honouring the proxy, timeout and agent.
    pub fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout);

        if let Some(proxy_url) = &self.proxy {
            let proxy = ReqwestProxy::all(proxy_url)
                .map_err(|e| SearchError::Other(format!("Failed to create proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| SearchError::Other(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Reuses one reqwest client per proxy and User-Agent pair so connections
/// stay pooled across requests.
///
/// The timeout of the first request that built a client sticks to it; set
/// the per-request timeout on the request itself.
#[derive(Debug, Default)]
pub struct ClientCache {
    clients: Mutex<HashMap<(Option<String>, String), Client>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client for `options`, building it on first use.
    pub fn get(&self, options: &RequestOptions) -> Result<Client> {
        let key = (options.proxy.clone(), options.user_agent.clone());
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = options.http_client()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for implementing search engine adapters.
///
/// An adapter performs one search against one backend. Proxy, timeout and
/// User-Agent are decided by the caller and passed in through
/// [`RequestOptions`].
#[async_trait]
pub trait Engine: Send + Sync {
    /// Returns the engine configuration.
    fn config(&self) -> &EngineConfig;

    /// Performs a search and returns raw results.
    async fn search(&self, query: &SearchQuery, options: &RequestOptions) -> Result<Vec<SearchResult>>;

    /// Returns the engine name.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Returns whether the engine is enabled.
    fn is_enabled(&self) -> bool {
        self.config().enabled
    }
}

/// Capability the dispatcher uses to run one search on one named engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Searches `engine` for `query`, optionally through `proxy`, giving up
    /// after `timeout`.
    async fn search(
        &self,
        engine: &str,
        query: &SearchQuery,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<SearchResult>>;
}
