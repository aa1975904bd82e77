//! End-to-end tests: orchestration with instrumented engines and the JSON API
//! engine against a mock HTTP server.
//!
//! The live Wikipedia test is marked with `#[ignore]` because it needs network
//! access. Run with: `cargo test --test integration -- --ignored`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use search_fanout::engines::{JsonApiConfig, JsonApiEngine};
use search_fanout::throttle::{DelayRange, ThrottleConfig};
use search_fanout::{
    DeadlineMode, Engine, EngineConfig, EngineRegistry, ProxyManager, RequestOptions, Result,
    SearchError, SearchOptions, SearchOrchestrator, SearchQuery, SearchResult, Settings,
    Throttler, UserAgentPolicy, NO_RESULTS_MESSAGE,
};

fn instant_throttler() -> Arc<Throttler> {
    Arc::new(Throttler::new(ThrottleConfig {
        default_delay: DelayRange::new(Duration::ZERO, Duration::ZERO),
        use_random_delays: false,
        ..Default::default()
    }))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

mod orchestration_tests {
    use super::*;

    /// Engine that sleeps, counts how many calls overlap and remembers the
    /// proxies it was handed.
    struct SlowEngine {
        config: EngineConfig,
        latency: Duration,
        urls: Vec<String>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        proxies: Arc<std::sync::Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl Engine for SlowEngine {
        fn config(&self) -> &EngineConfig {
            &self.config
        }

        async fn search(&self, _query: &SearchQuery, options: &RequestOptions) -> Result<Vec<SearchResult>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.proxies.lock().unwrap().push(options.proxy.clone());

            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.urls.is_empty() {
                return Err(SearchError::HttpStatus(500));
            }
            Ok(self
                .urls
                .iter()
                .map(|u| SearchResult::new(format!("{} {}", self.config.name, u), u.as_str(), ""))
                .collect())
        }
    }

    struct Fleet {
        registry: EngineRegistry,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        proxies: Arc<std::sync::Mutex<Vec<Option<String>>>>,
    }

    impl Fleet {
        fn new() -> Self {
            Self {
                registry: EngineRegistry::new(UserAgentPolicy::Fixed("it".into())),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                proxies: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }

        fn engine(mut self, name: &str, latency_ms: u64, urls: &[&str]) -> Self {
            self.registry.register(SlowEngine {
                config: EngineConfig::new(name),
                latency: Duration::from_millis(latency_ms),
                urls: urls.iter().map(|u| u.to_string()).collect(),
                in_flight: Arc::clone(&self.in_flight),
                peak: Arc::clone(&self.peak),
                proxies: Arc::clone(&self.proxies),
            });
            self
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_three_engines_two_workers() {
        let fleet = Fleet::new()
            .engine("a", 10, &["https://u1"])
            .engine("b", 10, &["https://u1", "https://u2"])
            .engine("c", 10, &[]);
        let peak = Arc::clone(&fleet.peak);
        let orch = SearchOrchestrator::new(Arc::new(fleet.registry)).with_throttler(instant_throttler());

        let response = orch
            .execute(
                SearchQuery::new("rust"),
                &names(&["a", "b", "c"]),
                &SearchOptions::default().with_max_workers(2),
            )
            .await
            .unwrap();

        let combined: Vec<(&str, &str)> = response
            .combined
            .iter()
            .map(|r| (r.url.as_str(), r.title.as_str()))
            .collect();
        assert_eq!(combined, vec![("https://u1", "a https://u1"), ("https://u2", "b https://u2")]);
        assert_eq!(response.total_count, 2);
        assert_eq!(response.metadata.errors.len(), 1);
        assert!(response.metadata.errors.contains_key("c"));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_concurrency() {
        let mut fleet = Fleet::new();
        let engines: Vec<String> = (0..12).map(|i| format!("engine{i}")).collect();
        for name in &engines {
            fleet = fleet.engine(name, 100, &["https://x"]);
        }
        let peak = Arc::clone(&fleet.peak);
        let orch = SearchOrchestrator::new(Arc::new(fleet.registry)).with_throttler(instant_throttler());

        let response = orch
            .execute(
                SearchQuery::new("q"),
                &engines,
                &SearchOptions::default().with_max_workers(4),
            )
            .await
            .unwrap();

        assert_eq!(response.per_engine.len(), 12);
        assert_eq!(response.total_count, 1);
        assert_eq!(peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_same_engine_across_calls() {
        let fleet = Fleet::new().engine("a", 0, &["https://a"]);
        let throttler = Arc::new(Throttler::new(ThrottleConfig {
            default_delay: DelayRange::new(Duration::from_secs(1), Duration::from_secs(1)),
            use_random_delays: false,
            ..Default::default()
        }));
        let orch = SearchOrchestrator::new(Arc::new(fleet.registry)).with_throttler(throttler);
        let options = SearchOptions::default();

        let started = tokio::time::Instant::now();
        orch.execute(SearchQuery::new("one"), &names(&["a"]), &options).await.unwrap();
        orch.execute(SearchQuery::new("two"), &names(&["a"]), &options).await.unwrap();

        // first request waits half the minimum, the second a full minimum after it
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxies_rotate_across_engines() {
        let fleet = Fleet::new()
            .engine("a", 5, &["https://a"])
            .engine("b", 5, &["https://b"])
            .engine("c", 5, &["https://c"])
            .engine("d", 5, &["https://d"]);
        let seen = Arc::clone(&fleet.proxies);
        let proxies = Arc::new(ProxyManager::with_proxies(["http://p1:8080", "http://p2:8080"]));
        let orch = SearchOrchestrator::new(Arc::new(fleet.registry))
            .with_throttler(instant_throttler())
            .with_proxies(Arc::clone(&proxies));

        orch.execute(SearchQuery::new("q"), &names(&["a", "b", "c", "d"]), &SearchOptions::default())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let p1 = seen.iter().filter(|p| p.as_deref() == Some("http://p1:8080")).count();
        let p2 = seen.iter().filter(|p| p.as_deref() == Some("http://p2:8080")).count();
        assert_eq!((p1, p2), (2, 2));
        assert!(proxies.stats().values().all(|r| r.requests == 2 && r.errors == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_deadline_returns_partial_response() {
        let fleet = Fleet::new()
            .engine("fast", 100, &["https://fast"])
            .engine("slow", 60_000, &["https://slow"]);
        let orch = SearchOrchestrator::new(Arc::new(fleet.registry)).with_throttler(instant_throttler());
        let options = SearchOptions::default().with_deadline(Duration::from_secs(2), DeadlineMode::BestEffort);

        let response = orch
            .execute(SearchQuery::new("q"), &names(&["fast", "slow"]), &options)
            .await
            .unwrap();

        assert_eq!(response.total_count, 1);
        assert_eq!(response.combined[0].url, "https://fast");
        assert!(response.metadata.errors["slow"].contains("deadline"));
        assert_eq!(response.metadata.engines, vec!["fast", "slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_deadline_skips_undispatched() {
        let fleet = Fleet::new()
            .engine("first", 3_000, &["https://first"])
            .engine("second", 10, &["https://second"]);
        let orch = SearchOrchestrator::new(Arc::new(fleet.registry)).with_throttler(instant_throttler());
        let options = SearchOptions::default()
            .with_max_workers(1)
            .with_deadline(Duration::from_secs(1), DeadlineMode::Drain);

        let response = orch
            .execute(SearchQuery::new("q"), &names(&["first", "second"]), &options)
            .await
            .unwrap();

        assert_eq!(response.total_count, 1);
        assert_eq!(response.combined[0].url, "https://first");
        assert!(response.metadata.errors.contains_key("second"));
        assert_eq!(response.metadata.engines, vec!["first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_state() {
        let fleet = Fleet::new()
            .engine("a", 50, &["https://a"])
            .engine("b", 50, &["https://b"]);
        let orch = Arc::new(SearchOrchestrator::new(Arc::new(fleet.registry)).with_throttler(instant_throttler()));

        let calls: Vec<_> = (0..5)
            .map(|i| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move {
                    orch.execute(
                        SearchQuery::new(format!("q{i}")),
                        &names(&["a", "b"]),
                        &SearchOptions::default(),
                    )
                    .await
                })
            })
            .collect();

        for call in futures::future::join_all(calls).await {
            let response = call.unwrap().unwrap();
            assert_eq!(response.total_count, 2);
        }
        assert!(orch.throttler().state("a").is_some());
    }
}

mod json_api_tests {
    use super::*;

    async fn server_with(status: u16, body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    fn settings_for(server: &MockServer) -> Settings {
        let mut api = JsonApiConfig::new("mock", format!("{}/search?q={{query}}&page={{page}}", server.uri()));
        api.results_pointer = "/results".to_string();
        api.snippet_field = "content".to_string();
        Settings {
            min_request_delay: 0.0,
            max_request_delay: 0.0,
            use_random_delays: false,
            request_timeout: 5,
            engines: vec![api],
            default_engines: names(&["mock"]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_json_engine_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust lang"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Rust", "url": "https://www.rust-lang.org", "content": "A <em>language</em>"},
                    {"title": "", "url": "https://doc.rust-lang.org", "content": ""},
                    {"title": "No link", "url": "", "content": "dropped"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let orch = SearchOrchestrator::from_settings(&settings_for(&server)).unwrap();
        let response = orch
            .execute(SearchQuery::new("rust lang").with_page(2), &[], &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.total_count, 2);
        assert_eq!(response.combined[0].snippet, "A language");
        assert_eq!(response.combined[1].title, "No title");
        assert_eq!(response.combined[1].snippet, "No description");
    }

    #[tokio::test]
    async fn test_json_engine_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(wiremock::matchers::header("user-agent", "FanoutTest/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let settings = Settings {
            user_agent: Some("FanoutTest/1.0".into()),
            ..settings_for(&server)
        };
        let orch = SearchOrchestrator::from_settings(&settings).unwrap();
        let response = orch
            .execute(SearchQuery::new("q"), &[], &SearchOptions::default())
            .await
            .unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_feeds_throttler() {
        let server = server_with(429, json!({"error": "slow down"})).await;
        let orch = SearchOrchestrator::from_settings(&settings_for(&server)).unwrap();

        for _ in 0..2 {
            let response = orch
                .execute(SearchQuery::new("q"), &[], &SearchOptions::default())
                .await
                .unwrap();
            assert_eq!(response.metadata.error.as_deref(), Some(NO_RESULTS_MESSAGE));
            assert!(response.metadata.errors["mock"].contains("429"));
        }
        assert!(orch.throttler().is_rate_limited("mock"));
    }

    #[tokio::test]
    async fn test_empty_body_is_block_signal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let orch = SearchOrchestrator::from_settings(&settings_for(&server)).unwrap();

        for _ in 0..2 {
            orch.execute(SearchQuery::new("q"), &[], &SearchOptions::default())
                .await
                .unwrap();
        }
        let state = orch.throttler().state("mock").unwrap();
        assert_eq!(state.rate_limit_strikes, 2);
    }

    #[tokio::test]
    async fn test_malformed_json_is_engine_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&server)
            .await;
        let orch = SearchOrchestrator::from_settings(&settings_for(&server)).unwrap();

        let response = orch
            .execute(SearchQuery::new("q"), &[], &SearchOptions::default())
            .await
            .unwrap();
        assert!(response.is_empty());
        assert!(response.metadata.errors["mock"].contains("parse"));
        assert!(!orch.throttler().is_rate_limited("mock"));
    }

    #[tokio::test]
    async fn test_unreachable_engine_does_not_sink_others() {
        let good = server_with(200, json!({"results": [{"title": "ok", "url": "https://ok.test"}]})).await;
        let mut settings = settings_for(&good);
        let mut dead = JsonApiConfig::new("dead", "http://127.0.0.1:9/search?q={query}");
        dead.results_pointer = "/results".to_string();
        settings.engines.push(dead);

        let orch = SearchOrchestrator::from_settings(&settings).unwrap();
        let response = orch
            .execute(SearchQuery::new("q"), &names(&["mock", "dead"]), &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.total_count, 1);
        assert!(response.metadata.errors.contains_key("dead"));
    }

    #[tokio::test]
    async fn test_company_strategy_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "\"Acme\" official website"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"title": "Acme Inc", "url": "https://acme.test"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Team", "url": "https://acme.test/team"},
                    {"title": "Acme Inc", "url": "https://acme.test"}
                ]
            })))
            .mount(&server)
            .await;

        let orch = SearchOrchestrator::from_settings(&settings_for(&server)).unwrap();
        let response = orch
            .search_company("Acme", &[], &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.per_engine.len(), 2);
        assert_eq!(response.per_engine[1].key, "company_website");
        assert_eq!(response.per_engine[1].count, 1);
        assert_eq!(response.total_count, 2);
    }
}

mod live_tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_wikipedia_search() {
        let engine = JsonApiEngine::wikipedia("en");
        let options = RequestOptions {
            proxy: None,
            timeout: Duration::from_secs(10),
            user_agent: UserAgentPolicy::builtin().next(),
        };
        let results = engine
            .search(&SearchQuery::new("rust programming language"), &options)
            .await
            .unwrap();
        for (i, result) in results.iter().take(3).enumerate() {
            println!("  {}. {} - {}", i + 1, result.title, result.url);
        }
        assert!(!results.is_empty(), "Wikipedia should return results");
    }
}
