//! Engine registry.
//!
//! The registry is built once at startup, then shared behind an `Arc`. It
//! knows which engine names (and aliases) are valid and routes
//! [`EngineClient`] calls to the matching [`Engine`] adapter, injecting the
//! User-Agent chosen by its [`UserAgentPolicy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::engine::{Engine, EngineClient, RequestOptions};
use crate::user_agent::UserAgentPolicy;
use crate::{Result, SearchError, SearchQuery, SearchResult};

/// Name-indexed collection of engine adapters.
pub struct EngineRegistry {
    engines: Vec<Arc<dyn Engine>>,
    index: HashMap<String, usize>,
    user_agents: UserAgentPolicy,
}

impl EngineRegistry {
    /// Creates an empty registry.
    pub fn new(user_agents: UserAgentPolicy) -> Self {
        Self {
            engines: Vec::new(),
            index: HashMap::new(),
            user_agents,
        }
    }

    /// Registers an engine under its name and aliases (case-insensitive).
    ///
    /// A later registration with the same name replaces the earlier one.
    pub fn register<E: Engine + 'static>(&mut self, engine: E) {
        self.register_arc(Arc::new(engine));
    }

    /// Registers an already shared engine.
    pub fn register_arc(&mut self, engine: Arc<dyn Engine>) {
        let config = engine.config();
        let slot = match self.index.get(&config.name.to_lowercase()) {
            Some(&existing) => {
                self.engines[existing] = Arc::clone(&engine);
                existing
            }
            None => {
                self.engines.push(Arc::clone(&engine));
                self.engines.len() - 1
            }
        };

        let config = engine.config();
        self.index.insert(config.name.to_lowercase(), slot);
        for alias in &config.aliases {
            self.index.entry(alias.to_lowercase()).or_insert(slot);
        }
        debug!(engine = %config.name, "Registered engine");
    }

    /// Names of all enabled engines, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.engines
            .iter()
            .filter(|e| e.is_enabled())
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Looks up an enabled engine by name or alias.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Engine>> {
        self.index
            .get(&name.trim().to_lowercase())
            .and_then(|&slot| self.engines.get(slot))
            .filter(|e| e.is_enabled())
    }

    /// Resolves caller-supplied engine names to canonical names.
    ///
    /// Order is kept, repeats are dropped. Fails on an empty list or on the
    /// first name that is not registered.
    pub fn resolve(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Err(SearchError::NoEngines);
        }

        let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            let engine = self
                .get(name)
                .ok_or_else(|| SearchError::UnknownEngine(name.clone()))?;
            let canonical = engine.name().to_string();
            if !resolved.contains(&canonical) {
                resolved.push(canonical);
            }
        }
        Ok(resolved)
    }

    /// Returns the User-Agent policy.
    pub fn user_agents(&self) -> &UserAgentPolicy {
        &self.user_agents
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new(UserAgentPolicy::default())
    }
}

#[async_trait]
impl EngineClient for EngineRegistry {
    async fn search(
        &self,
        engine: &str,
        query: &SearchQuery,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<SearchResult>> {
        let adapter = self
            .get(engine)
            .ok_or_else(|| SearchError::UnknownEngine(engine.to_string()))?;

        let options = RequestOptions {
            proxy: proxy.map(str::to_string),
            timeout,
            user_agent: self.user_agents.next(),
        };
        adapter.search(query, &options).await
    }
}
