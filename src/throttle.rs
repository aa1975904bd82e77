//! Per-engine request spacing with adaptive backoff.
//!
//! Every engine gets its own delay window. Consecutive requests to the same
//! engine are spaced by at least the lower bound of that window (or by a
//! random delay inside it). When an engine starts signalling rate limits the
//! window widens; a long enough streak of successes shrinks it back to the
//! configured values.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Strikes needed before the delay window starts widening.
const STRIKES_BEFORE_BACKOFF: u32 = 2;
/// Window multiplier applied per strike once backoff is active.
const BACKOFF_FACTOR: f64 = 1.5;
/// Consecutive successes needed for one recovery step.
const SUCCESSES_BEFORE_RECOVERY: u32 = 10;
/// Window multiplier applied per recovery step.
const RECOVERY_FACTOR: f64 = 0.9;
/// Fraction of the lower bound waited on an engine's very first request.
const FIRST_REQUEST_FACTOR: f64 = 0.5;

/// A `(min, max)` delay window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Window from fractional seconds.
    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(Duration::from_secs_f64(min), Duration::from_secs_f64(max))
    }

    fn scaled(self, factor: f64) -> Self {
        Self::new(self.min.mul_f64(factor), self.max.mul_f64(factor))
    }
}

/// Throttler settings.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Window used by engines without an override.
    pub default_delay: DelayRange,
    /// Pick a random delay inside the window instead of always the minimum.
    pub use_random_delays: bool,
    /// Per-engine windows.
    pub engine_delays: HashMap<String, DelayRange>,
    /// Upper limit for a widened window.
    pub backoff_ceiling: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_delay: DelayRange::from_secs_f64(0.5, 2.0),
            use_random_delays: true,
            engine_delays: HashMap::new(),
            backoff_ceiling: Duration::from_secs(60),
        }
    }
}

/// Bookkeeping for one engine.
#[derive(Debug, Clone)]
pub struct ThrottleState {
    /// Slot of the most recent request (may lie in the future while a
    /// reserved request is still sleeping).
    pub last_request_at: Option<Instant>,
    /// Current window.
    pub delay: DelayRange,
    /// Configured window, the floor for recovery.
    pub base_delay: DelayRange,
    pub rate_limit_strikes: u32,
    pub consecutive_successes: u32,
    /// Set while the window is widened.
    pub rate_limited: bool,
}

impl ThrottleState {
    fn new(base_delay: DelayRange) -> Self {
        Self {
            last_request_at: None,
            delay: base_delay,
            base_delay,
            rate_limit_strikes: 0,
            consecutive_successes: 0,
            rate_limited: false,
        }
    }
}

/// Spaces requests per engine and adapts to rate-limit signals.
///
/// One instance is meant to be shared (behind an `Arc`) by every
/// orchestration call in the process.
#[derive(Debug)]
pub struct Throttler {
    config: ThrottleConfig,
    states: Mutex<HashMap<String, ThrottleState>>,
}

impl Throttler {
    /// Creates a throttler with the given settings.
    pub fn new(config: ThrottleConfig) -> Self {
        if config.use_random_delays {
            info!(
                "Request throttling enabled with random delays: {:?}-{:?}",
                config.default_delay.min, config.default_delay.max
            );
        }
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the settings.
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ThrottleState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn base_delay(&self, engine: &str) -> DelayRange {
        self.config
            .engine_delays
            .get(engine)
            .copied()
            .unwrap_or(self.config.default_delay)
    }

    fn state_mut<'a>(
        &self,
        states: &'a mut HashMap<String, ThrottleState>,
        engine: &str,
    ) -> &'a mut ThrottleState {
        states
            .entry(engine.to_string())
            .or_insert_with(|| ThrottleState::new(self.base_delay(engine)))
    }

    fn pick_delay(&self, window: DelayRange) -> Duration {
        if !self.config.use_random_delays || window.max <= window.min {
            return window.min;
        }
        let secs = rand::thread_rng().gen_range(window.min.as_secs_f64()..=window.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Waits until `engine` may be contacted again and returns how long the
    /// caller slept.
    ///
    /// The request slot is reserved under the lock and the sleep happens
    /// after releasing it, so concurrent callers for the same engine queue up
    /// behind each other while callers for other engines are unaffected.
    pub async fn wait(&self, engine: &str) -> Duration {
        let (slot, delay) = {
            let mut states = self.lock();
            let now = Instant::now();
            let state = self.state_mut(&mut states, engine);
            let slot = match state.last_request_at {
                None => now + state.delay.min.mul_f64(FIRST_REQUEST_FACTOR),
                Some(last) => (last + self.pick_delay(state.delay)).max(now),
            };
            state.last_request_at = Some(slot);
            (slot, slot.saturating_duration_since(now))
        };

        if !delay.is_zero() {
            debug!(engine, ?delay, "Throttling request");
            sleep_until(slot).await;
        }
        delay
    }

    /// Returns the delay a request would currently target, without sleeping
    /// or touching the last-request time.
    pub fn peek_delay(&self, engine: &str) -> Duration {
        let window = self
            .lock()
            .get(engine)
            .map(|s| s.delay)
            .unwrap_or_else(|| self.base_delay(engine));
        self.pick_delay(window)
    }

    /// Records that `engine` answered with something that looks like a block.
    ///
    /// A widened window is capped at the backoff ceiling but never drops
    /// below the engine's configured window.
    pub fn record_rate_limited(&self, engine: &str) {
        let mut states = self.lock();
        let ceiling = self.config.backoff_ceiling;
        let state = self.state_mut(&mut states, engine);

        state.rate_limit_strikes += 1;
        state.consecutive_successes = 0;

        if state.rate_limit_strikes >= STRIKES_BEFORE_BACKOFF {
            let widened = state.delay.scaled(BACKOFF_FACTOR);
            state.delay = DelayRange::new(
                widened.min.min(ceiling).max(state.base_delay.min),
                widened.max.min(ceiling).max(state.base_delay.max),
            );
            state.rate_limited = true;
            warn!(
                engine,
                strikes = state.rate_limit_strikes,
                min = ?state.delay.min,
                max = ?state.delay.max,
                "Engine is rate limiting, widening delay window"
            );
        } else {
            debug!(engine, strikes = state.rate_limit_strikes, "Rate limit strike");
        }
    }

    /// Records a successful request to `engine`.
    pub fn record_success(&self, engine: &str) {
        let mut states = self.lock();
        let state = self.state_mut(&mut states, engine);

        state.consecutive_successes += 1;
        if state.consecutive_successes < SUCCESSES_BEFORE_RECOVERY {
            return;
        }
        state.consecutive_successes = 0;

        if !state.rate_limited {
            // A lone strike is forgotten after a clean streak.
            state.rate_limit_strikes = 0;
            return;
        }

        let narrowed = state.delay.scaled(RECOVERY_FACTOR);
        state.delay = DelayRange::new(
            narrowed.min.max(state.base_delay.min),
            narrowed.max.max(state.base_delay.max),
        );

        if state.delay == state.base_delay {
            state.rate_limited = false;
            state.rate_limit_strikes = 0;
            info!(engine, "Engine recovered, delay window back to configured values");
        } else {
            debug!(engine, min = ?state.delay.min, max = ?state.delay.max, "Narrowing delay window");
        }
    }

    /// Clears the recorded last-request time of one engine, or of all.
    pub fn reset(&self, engine: Option<&str>) {
        let mut states = self.lock();
        match engine {
            Some(name) => {
                if let Some(state) = states.get_mut(name) {
                    state.last_request_at = None;
                }
            }
            None => {
                for state in states.values_mut() {
                    state.last_request_at = None;
                }
            }
        }
    }

    /// Current delay window of `engine`.
    pub fn delay_bounds(&self, engine: &str) -> DelayRange {
        self.lock()
            .get(engine)
            .map(|s| s.delay)
            .unwrap_or_else(|| self.base_delay(engine))
    }

    /// Whether `engine` is currently in backoff.
    pub fn is_rate_limited(&self, engine: &str) -> bool {
        self.lock().get(engine).is_some_and(|s| s.rate_limited)
    }

    /// Snapshot of one engine's bookkeeping.
    pub fn state(&self, engine: &str) -> Option<ThrottleState> {
        self.lock().get(engine).cloned()
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}
