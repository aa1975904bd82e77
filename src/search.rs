//! Search orchestration.
//!
//! [`SearchOrchestrator`] validates a request, turns it into engine tasks,
//! runs them through the [`Dispatcher`] and hands the outcomes to the
//! [`Aggregator`]. Throttling and proxy state live behind `Arc`s so that
//! concurrent calls on the same orchestrator share them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Settings;
use crate::dispatcher::{DeadlineMode, DispatchSettings, Dispatcher, EngineTask};
use crate::engines::JsonApiEngine;
use crate::proxy::{ProxyManager, ProxyProvider};
use crate::registry::EngineRegistry;
use crate::templates;
use crate::throttle::Throttler;
use crate::user_agent::UserAgentPolicy;
use crate::{AggregatedResponse, Aggregator, Result, SearchError, SearchQuery};

/// Sub-query key of the company-name search.
pub const COMPANY_NAME_KEY: &str = "company_name";
/// Sub-query key of the company-website search.
pub const COMPANY_WEBSITE_KEY: &str = "company_website";

/// Per-call options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Upper bound on concurrently running engine tasks.
    pub max_workers: usize,
    /// Drop repeated URLs within one engine's results.
    pub ignore_duplicates: bool,
    /// Bound for the whole call.
    pub deadline: Option<Duration>,
    pub deadline_mode: DeadlineMode,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_workers: 5,
            ignore_duplicates: true,
            deadline: None,
            deadline_mode: DeadlineMode::Drain,
        }
    }
}

impl SearchOptions {
    /// Sets the worker bound.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration, mode: DeadlineMode) -> Self {
        self.deadline = Some(deadline);
        self.deadline_mode = mode;
        self
    }
}

impl From<&Settings> for SearchOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_workers: settings.max_workers,
            ignore_duplicates: settings.ignore_duplicates,
            deadline: settings.overall_deadline.map(Duration::from_secs_f64),
            deadline_mode: settings.deadline_mode,
        }
    }
}

/// Fans searches out to engines and merges the results.
pub struct SearchOrchestrator {
    registry: Arc<EngineRegistry>,
    throttler: Arc<Throttler>,
    proxies: Arc<ProxyManager>,
    aggregator: Aggregator,
    dispatch: DispatchSettings,
    default_engines: Vec<String>,
}

impl SearchOrchestrator {
    /// Creates an orchestrator over a registry with default throttling, no
    /// proxies and default dispatch settings.
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            throttler: Arc::new(Throttler::default()),
            proxies: Arc::new(ProxyManager::new()),
            aggregator: Aggregator::new(),
            dispatch: DispatchSettings::default(),
            default_engines: Vec::new(),
        }
    }

    /// Builds everything from settings: JSON API engines, user agent policy,
    /// throttler, proxy pool and aggregator.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let mut registry =
            EngineRegistry::new(UserAgentPolicy::from_option(settings.user_agent.clone()));
        for api in &settings.engines {
            registry.register(JsonApiEngine::new(api.clone()));
        }
        info!(engines = registry.len(), "Loaded engines");

        let proxies = ProxyManager::with_proxies(settings.proxy_urls()?);
        let aggregator = Aggregator::new()
            .with_normalized_urls(settings.normalize_urls)
            .with_instance_id(settings.instance_id.clone());

        Ok(Self::new(Arc::new(registry))
            .with_throttler(Arc::new(Throttler::new(settings.throttle_config())))
            .with_proxies(Arc::new(proxies))
            .with_aggregator(aggregator)
            .with_dispatch_settings(settings.dispatch_settings())
            .with_default_engines(settings.default_engines.clone()))
    }

    /// Uses a shared throttler.
    pub fn with_throttler(mut self, throttler: Arc<Throttler>) -> Self {
        self.throttler = throttler;
        self
    }

    /// Uses a shared proxy pool.
    pub fn with_proxies(mut self, proxies: Arc<ProxyManager>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Sets the request timeout, per-engine result cap and default deadline.
    pub fn with_dispatch_settings(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Engines used when a call names none.
    pub fn with_default_engines(mut self, engines: Vec<String>) -> Self {
        self.default_engines = engines;
        self
    }

    /// Names of the enabled engines.
    pub fn engines(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    pub fn proxies(&self) -> &Arc<ProxyManager> {
        &self.proxies
    }

    /// Syncs the proxy pool with a provider.
    pub async fn refresh_proxies(&self, provider: &dyn ProxyProvider) -> Result<()> {
        self.proxies.refresh(provider).await
    }

    /// Keeps the proxy pool in sync with a provider in the background.
    pub fn watch_proxies(&self, provider: Arc<dyn ProxyProvider>) -> JoinHandle<()> {
        self.proxies.spawn_refresh(provider)
    }

    /// Runs `query` on every engine in `engines` and merges the results.
    ///
    /// Configuration problems (empty query, no or unknown engines, zero
    /// workers) are returned as errors before anything is dispatched. Engine
    /// failures are not errors: they show up in `metadata.errors`, and a call
    /// where no engine produced anything returns the empty response.
    pub async fn execute(
        &self,
        query: SearchQuery,
        engines: &[String],
        options: &SearchOptions,
    ) -> Result<AggregatedResponse> {
        query.validate()?;
        let engines = self.resolve_engines(engines)?;
        check_workers(options)?;

        let started = Instant::now();
        info!(query = %query.text, engines = ?engines, "Starting search");

        let query = Arc::new(query);
        let tasks = engines
            .iter()
            .map(|engine| EngineTask::new(engine.clone(), Arc::clone(&query)))
            .collect();

        let outcomes = self
            .dispatcher(options)
            .run_all(tasks, options.max_workers)
            .await?;

        let mut response = self.aggregator.merge(outcomes, &engines, &query.text);
        response.set_duration(started.elapsed().as_millis() as u64);
        info!(
            total = response.total_count,
            failed = response.metadata.errors.len(),
            duration_ms = response.metadata.duration_ms,
            "Search finished"
        );
        Ok(response)
    }

    /// Runs several keyed queries at once, the i-th on
    /// `engines[i % engines.len()]`, and merges them in query order.
    pub async fn execute_multiple(
        &self,
        label: &str,
        queries: Vec<(String, SearchQuery)>,
        engines: &[String],
        options: &SearchOptions,
    ) -> Result<AggregatedResponse> {
        if queries.is_empty() {
            return Err(SearchError::InvalidQuery("no sub-queries given".into()));
        }
        for (_, query) in &queries {
            query.validate()?;
        }
        let engines = self.resolve_engines(engines)?;
        check_workers(options)?;

        let started = Instant::now();
        let order: Vec<String> = queries.iter().map(|(key, _)| key.clone()).collect();
        info!(label, sub_queries = order.len(), engines = ?engines, "Starting multi-query search");

        let outcomes = self
            .dispatcher(options)
            .run_multiple(queries, &engines, options.max_workers)
            .await?;

        let mut response = self.aggregator.merge(outcomes, &order, label);
        response.set_duration(started.elapsed().as_millis() as u64);
        Ok(response)
    }

    /// Looks for pages mentioning a domain.
    pub async fn search_domain(
        &self,
        domain: &str,
        engines: &[String],
        options: &SearchOptions,
    ) -> Result<AggregatedResponse> {
        let text = templates::domain_query(domain)?;
        self.execute(SearchQuery::new(text), engines, options).await
    }

    /// Looks for a person at a domain, including likely e-mail addresses.
    pub async fn search_person(
        &self,
        full_name: &str,
        domain: &str,
        engines: &[String],
        options: &SearchOptions,
    ) -> Result<AggregatedResponse> {
        let text = templates::person_query(full_name, domain)?;
        self.execute(SearchQuery::new(text), engines, options).await
    }

    /// Looks for a company's pages and its official website in parallel.
    pub async fn search_company(
        &self,
        company: &str,
        engines: &[String],
        options: &SearchOptions,
    ) -> Result<AggregatedResponse> {
        let queries = vec![
            (
                COMPANY_NAME_KEY.to_string(),
                SearchQuery::new(templates::company_name_query(company)?),
            ),
            (
                COMPANY_WEBSITE_KEY.to_string(),
                SearchQuery::new(templates::company_website_query(company)?),
            ),
        ];
        self.execute_multiple(company.trim(), queries, engines, options)
            .await
    }

    fn resolve_engines(&self, requested: &[String]) -> Result<Vec<String>> {
        let requested = if requested.is_empty() {
            debug!(engines = ?self.default_engines, "No engines requested, using defaults");
            &self.default_engines
        } else {
            requested
        };
        self.registry.resolve(requested)
    }

    fn dispatcher(&self, options: &SearchOptions) -> Dispatcher {
        let settings = DispatchSettings {
            ignore_duplicates: options.ignore_duplicates,
            deadline: options.deadline.or(self.dispatch.deadline),
            deadline_mode: if options.deadline.is_some() {
                options.deadline_mode
            } else {
                self.dispatch.deadline_mode
            },
            ..self.dispatch.clone()
        };
        Dispatcher::new(
            self.registry.clone(),
            Arc::clone(&self.throttler),
            Arc::clone(&self.proxies),
            settings,
        )
    }
}

fn check_workers(options: &SearchOptions) -> Result<()> {
    if options.max_workers == 0 {
        return Err(SearchError::Config("max_workers must be greater than 0".into()));
    }
    Ok(())
}
