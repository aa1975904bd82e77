//! Settings for the orchestrator, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working configuration:
//!
//! ```toml
//! max_workers = 5
//! min_request_delay = 0.5
//! max_request_delay = 2.0
//! proxies = ["socks5://127.0.0.1:1080"]
//!
//! [engine_delays.wikipedia]
//! min = 1.0
//! max = 3.0
//!
//! [[engines]]
//! name = "acme"
//! url = "https://api.acme.test/search?q={query}&page={page}"
//! results_pointer = "/results"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::DEFAULT_INSTANCE_ID;
use crate::dispatcher::{DeadlineMode, DispatchSettings};
use crate::engines::{JsonApiConfig, JsonApiEngine};
use crate::proxy::ProxyConfig;
use crate::throttle::{DelayRange, ThrottleConfig};
use crate::{Result, SearchError};

/// Environment variable overriding [`Settings::instance_id`].
pub const INSTANCE_ID_ENV: &str = "INSTANCE_ID";

/// Per-engine delay window in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineDelay {
    pub min: f64,
    pub max: f64,
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on concurrently running engine tasks.
    pub max_workers: usize,
    /// Results kept per engine.
    pub max_results_per_engine: usize,
    /// Lower bound of the inter-request delay, in seconds.
    pub min_request_delay: f64,
    /// Upper bound of the inter-request delay, in seconds.
    pub max_request_delay: f64,
    pub use_random_delays: bool,
    /// Delay windows per engine name.
    pub engine_delays: HashMap<String, EngineDelay>,
    /// Largest delay a rate-limited engine can be pushed to, in seconds.
    pub backoff_ceiling: f64,
    /// Proxy URLs.
    pub proxies: Vec<String>,
    /// Per-request timeout, in seconds.
    pub request_timeout: u64,
    /// Bound for a whole call, in seconds.
    pub overall_deadline: Option<f64>,
    pub deadline_mode: DeadlineMode,
    /// Drop repeated URLs within one engine's results.
    pub ignore_duplicates: bool,
    /// Ignore scheme, trailing slash and case when merging across engines.
    pub normalize_urls: bool,
    /// Engines used when the caller names none.
    pub default_engines: Vec<String>,
    /// Identifier reported in response metadata.
    pub instance_id: String,
    /// Fixed User-Agent; a built-in pool is rotated when unset.
    pub user_agent: Option<String>,
    /// JSON API engine definitions.
    pub engines: Vec<JsonApiConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_results_per_engine: 10,
            min_request_delay: 0.5,
            max_request_delay: 2.0,
            use_random_delays: true,
            engine_delays: HashMap::new(),
            backoff_ceiling: 60.0,
            proxies: Vec::new(),
            request_timeout: 30,
            overall_deadline: None,
            deadline_mode: DeadlineMode::Drain,
            ignore_duplicates: true,
            normalize_urls: false,
            default_engines: Vec::new(),
            instance_id: DEFAULT_INSTANCE_ID.to_string(),
            user_agent: None,
            engines: default_engines(),
        }
    }
}

fn default_engines() -> Vec<JsonApiConfig> {
    vec![JsonApiEngine::wikipedia("en").api().clone()]
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SearchError::Config(format!("Invalid settings: {}", e)))
    }

    /// Loads settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        info!("Loading settings from: {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Loads from `path` if given, defaults otherwise, then applies the
    /// environment and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No settings file given, using defaults");
                Self::default()
            }
        };
        settings.merge_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Applies environment overrides.
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var(INSTANCE_ID_ENV) {
            if !val.trim().is_empty() {
                self.instance_id = val;
            }
        }
    }

    /// Rejects values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(SearchError::Config("max_workers must be greater than 0".into()));
        }
        if self.max_results_per_engine == 0 {
            return Err(SearchError::Config(
                "max_results_per_engine must be greater than 0".into(),
            ));
        }
        if self.request_timeout == 0 {
            return Err(SearchError::Config("request_timeout must be greater than 0".into()));
        }
        check_window("request delay", self.min_request_delay, self.max_request_delay)?;
        for (engine, delay) in &self.engine_delays {
            check_window(&format!("{} delay", engine), delay.min, delay.max)?;
        }
        if !self.backoff_ceiling.is_finite() || self.backoff_ceiling < self.max_request_delay {
            return Err(SearchError::Config(
                "backoff_ceiling must not be below max_request_delay".into(),
            ));
        }
        for (engine, delay) in &self.engine_delays {
            if delay.max > self.backoff_ceiling {
                return Err(SearchError::Config(format!(
                    "{} delay ({}s) exceeds backoff_ceiling ({}s)",
                    engine, delay.max, self.backoff_ceiling
                )));
            }
        }
        if let Some(deadline) = self.overall_deadline {
            if !deadline.is_finite() || deadline <= 0.0 {
                return Err(SearchError::Config("overall_deadline must be positive".into()));
            }
        }
        for proxy in &self.proxies {
            ProxyConfig::parse(proxy)?;
        }
        for engine in &self.engines {
            if engine.name.trim().is_empty() {
                return Err(SearchError::Config("engine definition without a name".into()));
            }
            if !engine.url.contains("{query}") {
                return Err(SearchError::Config(format!(
                    "engine {} url has no {{query}} placeholder",
                    engine.name
                )));
            }
        }
        Ok(())
    }

    /// Throttler settings derived from the delay fields.
    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            default_delay: DelayRange::from_secs_f64(self.min_request_delay, self.max_request_delay),
            use_random_delays: self.use_random_delays,
            engine_delays: self
                .engine_delays
                .iter()
                .map(|(name, d)| (name.clone(), DelayRange::from_secs_f64(d.min, d.max)))
                .collect(),
            backoff_ceiling: Duration::from_secs_f64(self.backoff_ceiling),
        }
    }

    /// Dispatcher settings derived from the timeout and result fields.
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            request_timeout: Duration::from_secs(self.request_timeout),
            max_results_per_engine: self.max_results_per_engine,
            ignore_duplicates: self.ignore_duplicates,
            deadline: self.overall_deadline.map(Duration::from_secs_f64),
            deadline_mode: self.deadline_mode,
        }
    }

    /// Proxy URLs in canonical form.
    pub fn proxy_urls(&self) -> Result<Vec<String>> {
        self.proxies
            .iter()
            .map(|raw| ProxyConfig::parse(raw).map(|p| p.url()))
            .collect()
    }
}

fn check_window(what: &str, min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max < 0.0 {
        return Err(SearchError::Config(format!("{} must be non-negative", what)));
    }
    if min > max {
        return Err(SearchError::Config(format!(
            "{} range is inverted ({} > {})",
            what, min, max
        )));
    }
    Ok(())
}
