//! Bounded worker pool that runs engine tasks.
//!
//! [`Dispatcher::run_all`] spawns at most `max_workers` tokio tasks. Each one
//! pulls [`EngineTask`]s from a shared queue until it is empty, and for every
//! task waits on the [`Throttler`], picks a proxy from the [`ProxyManager`],
//! calls the [`EngineClient`] and feeds the result back into both. Outcomes
//! land in a map guarded by its own lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineClient;
use crate::proxy::ProxyManager;
use crate::result::{normalize_results, EngineOutcome};
use crate::throttle::Throttler;
use crate::{Result, SearchError, SearchQuery};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One unit of work: run `query` on `engine` and store the outcome under `key`.
#[derive(Debug, Clone)]
pub struct EngineTask {
    pub key: String,
    pub engine: String,
    pub query: Arc<SearchQuery>,
}

impl EngineTask {
    /// A task whose outcome is keyed by the engine name.
    pub fn new(engine: impl Into<String>, query: Arc<SearchQuery>) -> Self {
        let engine = engine.into();
        Self {
            key: engine.clone(),
            engine,
            query,
        }
    }

    /// A task with an explicit outcome key.
    pub fn keyed(key: impl Into<String>, engine: impl Into<String>, query: Arc<SearchQuery>) -> Self {
        Self {
            key: key.into(),
            engine: engine.into(),
            query,
        }
    }
}

/// What happens to running work when the overall deadline expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineMode {
    /// Stop handing out new tasks, let the ones already started finish.
    #[default]
    Drain,
    /// Stop immediately and return whatever has been collected.
    BestEffort,
}

/// Knobs of a dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Bound for each engine call.
    pub request_timeout: Duration,
    /// Results kept per engine after normalization.
    pub max_results_per_engine: usize,
    /// Drop repeated URLs inside one engine's list.
    pub ignore_duplicates: bool,
    /// Bound for the whole run.
    pub deadline: Option<Duration>,
    pub deadline_mode: DeadlineMode,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_results_per_engine: 10,
            ignore_duplicates: true,
            deadline: None,
            deadline_mode: DeadlineMode::Drain,
        }
    }
}

type OutcomeMap = HashMap<String, EngineOutcome>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs engine tasks on a bounded pool of workers.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn EngineClient>,
    throttler: Arc<Throttler>,
    proxies: Arc<ProxyManager>,
    settings: DispatchSettings,
}

impl Dispatcher {
    /// Creates a dispatcher over shared throttling and proxy state.
    pub fn new(
        client: Arc<dyn EngineClient>,
        throttler: Arc<Throttler>,
        proxies: Arc<ProxyManager>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            client,
            throttler,
            proxies,
            settings,
        }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Runs every task and returns one outcome per task key.
    ///
    /// Spawns `min(max_workers, tasks.len())` workers and returns once all of
    /// them are done, or once the deadline handling of
    /// [`DispatchSettings::deadline_mode`] kicks in. Tasks that never
    /// completed because of the deadline are reported as
    /// [`SearchError::DeadlineExceeded`]; those still queued at that point
    /// are marked as not dispatched.
    pub async fn run_all(&self, tasks: Vec<EngineTask>, max_workers: usize) -> Result<OutcomeMap> {
        if max_workers == 0 {
            return Err(SearchError::Config(
                "max_workers must be greater than 0".into(),
            ));
        }
        if tasks.is_empty() {
            return Ok(HashMap::new());
        }

        let total = tasks.len();
        let keys: Vec<(String, String)> = tasks
            .iter()
            .map(|t| (t.key.clone(), t.engine.clone()))
            .collect();
        let worker_count = max_workers.min(total);
        info!(tasks = total, workers = worker_count, "Dispatching engine tasks");

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let outcomes: Arc<Mutex<OutcomeMap>> = Arc::new(Mutex::new(HashMap::with_capacity(total)));
        let started: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let stop = CancellationToken::new();

        let handles: Vec<_> = (0..worker_count)
            .map(|id| {
                let dispatcher = self.clone();
                let queue = Arc::clone(&queue);
                let outcomes = Arc::clone(&outcomes);
                let started = Arc::clone(&started);
                let stop = stop.clone();
                tokio::spawn(async move {
                    dispatcher.worker(id, queue, outcomes, started, stop).await
                })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let workers = join_all(handles);

        match self.settings.deadline {
            None => {
                workers.await;
            }
            Some(deadline) => {
                tokio::pin!(workers);
                tokio::select! {
                    _ = &mut workers => {}
                    _ = sleep(deadline) => {
                        stop.cancel();
                        match self.settings.deadline_mode {
                            DeadlineMode::Drain => {
                                warn!(?deadline, "Deadline reached, draining tasks already started");
                                workers.await;
                            }
                            DeadlineMode::BestEffort => {
                                warn!(?deadline, "Deadline reached, abandoning running tasks");
                                for abort in &aborts {
                                    abort.abort();
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut collected = std::mem::take(&mut *lock(&outcomes));
        let started = std::mem::take(&mut *lock(&started));
        for (key, engine) in keys {
            collected.entry(key).or_insert_with_key(|key| {
                if started.contains(key) {
                    EngineOutcome::failure(key.clone(), engine, SearchError::DeadlineExceeded, Duration::ZERO)
                } else {
                    EngineOutcome::not_started(key.clone(), engine)
                }
            });
        }

        let failed = collected.values().filter(|o| o.is_error()).count();
        info!(tasks = total, failed, "Engine tasks finished");
        Ok(collected)
    }

    /// Runs several queries at once, assigning the i-th query to
    /// `engines[i % engines.len()]`. Outcomes are keyed by query key.
    pub async fn run_multiple(
        &self,
        queries: Vec<(String, SearchQuery)>,
        engines: &[String],
        max_workers: usize,
    ) -> Result<OutcomeMap> {
        if engines.is_empty() {
            return Err(SearchError::NoEngines);
        }

        let tasks = queries
            .into_iter()
            .enumerate()
            .map(|(i, (key, query))| {
                let engine = &engines[i % engines.len()];
                debug!(key = %key, engine = %engine, "Assigned sub-query");
                EngineTask::keyed(key, engine.clone(), Arc::new(query))
            })
            .collect();

        self.run_all(tasks, max_workers).await
    }

    async fn worker(
        &self,
        id: usize,
        queue: Arc<Mutex<VecDeque<EngineTask>>>,
        outcomes: Arc<Mutex<OutcomeMap>>,
        started: Arc<Mutex<HashSet<String>>>,
        stop: CancellationToken,
    ) {
        loop {
            if stop.is_cancelled() {
                debug!(worker = id, "Stop requested, not pulling further tasks");
                break;
            }
            let Some(task) = lock(&queue).pop_front() else {
                break;
            };
            lock(&started).insert(task.key.clone());

            let outcome = self.execute(task).await;
            lock(&outcomes).insert(outcome.key.clone(), outcome);
        }
    }

    /// Runs one task end to end.
    async fn execute(&self, task: EngineTask) -> EngineOutcome {
        let engine = task.engine.as_str();
        let waited = self.throttler.wait(engine).await;
        let proxy = self.proxies.acquire(engine);
        debug!(
            key = %task.key,
            engine,
            ?waited,
            proxy = proxy.as_deref().unwrap_or("none"),
            "Starting search"
        );

        let request_timeout = self.settings.request_timeout;
        let started = Instant::now();
        let result = match timeout(
            request_timeout,
            self.client
                .search(engine, &task.query, proxy.as_deref(), request_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(raw) => {
                if let Some(proxy) = &proxy {
                    self.proxies.report_success(proxy);
                }
                self.throttler.record_success(engine);

                let limit = self.settings.max_results_per_engine.min(task.query.limit);
                let results = normalize_results(raw, limit, self.settings.ignore_duplicates);
                info!(engine, results = results.len(), ?elapsed, "Search completed");
                EngineOutcome::success(task.key, task.engine, results, elapsed)
            }
            Err(err) => {
                warn!(engine, error = %err, ?elapsed, "Search failed");
                if err.is_transport() {
                    if let Some(proxy) = &proxy {
                        self.proxies.report_error(proxy, engine);
                    }
                }
                if err.is_rate_limit_signal() {
                    self.throttler.record_rate_limited(engine);
                }
                EngineOutcome::failure(task.key, task.engine, err, elapsed)
            }
        }
    }
}
