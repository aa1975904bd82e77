//! # search-fanout
//!
//! Concurrent search orchestration: one logical query is fanned out to several
//! search engines under a bounded worker pool, with per-engine adaptive
//! throttling and proxy rotation, and the answers are merged into a single
//! deduplicated result set.
//!
//! - [`Throttler`] spaces requests to the same engine and backs off when an
//!   engine starts blocking.
//! - [`ProxyManager`] rotates proxies and cools down the ones that fail.
//! - [`Dispatcher`] runs engine tasks on at most `max_workers` tokio tasks.
//! - [`Aggregator`] merges per-engine lists, first engine wins on a shared URL.
//! - [`SearchOrchestrator`] ties them together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use search_fanout::{SearchOptions, SearchOrchestrator, SearchQuery, Settings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = SearchOrchestrator::from_settings(&Settings::default())?;
//!
//!     let response = orchestrator
//!         .execute(
//!             SearchQuery::new("rust programming"),
//!             &["wikipedia".to_string()],
//!             &SearchOptions::default(),
//!         )
//!         .await?;
//!
//!     for result in &response.combined {
//!         println!("{}: {}", result.title, result.url);
//!     }
//!     Ok(())
//! }
//! ```

mod aggregator;
mod engine;
mod error;
mod query;
mod registry;
mod result;
mod search;

pub mod config;
pub mod dispatcher;
pub mod engines;
pub mod proxy;
pub mod templates;
pub mod throttle;
pub mod user_agent;

pub use aggregator::{Aggregator, DEFAULT_INSTANCE_ID};
pub use config::Settings;
pub use dispatcher::{DeadlineMode, DispatchSettings, Dispatcher, EngineTask};
pub use engine::{ClientCache, Engine, EngineClient, EngineConfig, RequestOptions};
pub use error::{Result, SearchError};
pub use proxy::{ProxyManager, ProxyProvider};
pub use query::SearchQuery;
pub use registry::EngineRegistry;
pub use result::{
    normalize_results, AggregatedResponse, EngineOutcome, EngineResults, ResponseMetadata,
    SearchResult, NO_RESULTS_MESSAGE,
};
pub use search::{SearchOptions, SearchOrchestrator, COMPANY_NAME_KEY, COMPANY_WEBSITE_KEY};
pub use throttle::Throttler;
pub use user_agent::UserAgentPolicy;
