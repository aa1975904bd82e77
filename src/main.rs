//! search-fanout CLI - fan a query out to several engines and merge the results.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use search_fanout::{
    proxy::ProxyConfig, AggregatedResponse, DeadlineMode, SearchOptions, SearchOrchestrator,
    SearchQuery, Settings,
};

/// search-fanout - concurrent meta search
#[derive(Parser)]
#[command(name = "search-fanout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "SEARCH_FANOUT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search one query on several engines
    Search {
        /// Search query
        query: String,

        #[command(flatten)]
        run: RunArgs,

        /// Results requested per engine
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Result page
        #[arg(long, default_value = "1")]
        page: u32,

        /// Query language (e.g. en, de)
        #[arg(long)]
        language: Option<String>,
    },

    /// Find pages mentioning a domain
    Domain {
        domain: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Find a person at a company domain
    Person {
        /// Full name, e.g. "Jane Doe"
        name: String,
        domain: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Find a company's pages and official website
    Company {
        name: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List available search engines
    Engines,
}

#[derive(Args)]
struct RunArgs {
    /// Search engines to use (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    engines: Vec<String>,

    /// Maximum number of concurrent engine requests
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Overall deadline in seconds
    #[arg(short, long)]
    deadline: Option<f64>,

    /// Return as soon as the deadline passes instead of waiting for running requests
    #[arg(long)]
    best_effort: bool,

    /// Proxy URL (e.g., http://127.0.0.1:8080 or socks5://127.0.0.1:1080); repeatable
    #[arg(short, long)]
    proxy: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Compact single-line output
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Engines => list_engines(&settings),
        Commands::Search {
            query,
            run,
            limit,
            page,
            language,
        } => {
            let mut query = SearchQuery::new(query).with_limit(limit).with_page(page);
            if let Some(language) = language {
                query = query.with_language(language);
            }
            let (orchestrator, options) = prepare(settings, &run)?;
            let response = orchestrator.execute(query, &run.engines, &options).await?;
            print_response(&response, run.format)
        }
        Commands::Domain { domain, run } => {
            let (orchestrator, options) = prepare(settings, &run)?;
            let response = orchestrator
                .search_domain(&domain, &run.engines, &options)
                .await?;
            print_response(&response, run.format)
        }
        Commands::Person { name, domain, run } => {
            let (orchestrator, options) = prepare(settings, &run)?;
            let response = orchestrator
                .search_person(&name, &domain, &run.engines, &options)
                .await?;
            print_response(&response, run.format)
        }
        Commands::Company { name, run } => {
            let (orchestrator, options) = prepare(settings, &run)?;
            let response = orchestrator
                .search_company(&name, &run.engines, &options)
                .await?;
            print_response(&response, run.format)
        }
    }
}

/// Logs go to stderr so stdout only carries results.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Applies command-line overrides to the settings and builds the orchestrator.
fn prepare(mut settings: Settings, run: &RunArgs) -> Result<(SearchOrchestrator, SearchOptions)> {
    if let Some(workers) = run.workers {
        settings.max_workers = workers;
    }
    if let Some(timeout) = run.timeout {
        settings.request_timeout = timeout;
    }
    if let Some(deadline) = run.deadline {
        settings.overall_deadline = Some(deadline);
    }
    if run.best_effort {
        settings.deadline_mode = DeadlineMode::BestEffort;
    }
    for raw in &run.proxy {
        let proxy = ProxyConfig::parse(raw).with_context(|| format!("Invalid proxy: {}", raw))?;
        settings.proxies.push(proxy.url());
    }
    if settings.default_engines.is_empty() {
        settings.default_engines = settings
            .engines
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.name.clone())
            .collect();
    }
    if !run.proxy.is_empty() && matches!(run.format, OutputFormat::Text) {
        eprintln!("Using {} proxy(ies)", run.proxy.len());
    }

    let orchestrator = SearchOrchestrator::from_settings(&settings)?;
    let options = SearchOptions::from(&settings);
    Ok((orchestrator, options))
}

fn list_engines(settings: &Settings) -> Result<()> {
    let orchestrator = SearchOrchestrator::from_settings(settings)?;

    println!("Available search engines:\n");
    for name in orchestrator.engines() {
        let aliases = orchestrator
            .registry()
            .get(&name)
            .map(|e| e.config().aliases.join(", "))
            .unwrap_or_default();
        if aliases.is_empty() {
            println!("  {}", name);
        } else {
            println!("  {:<12} (aliases: {})", name, aliases);
        }
    }
    if !settings.default_engines.is_empty() {
        println!("\nDefault: {}", settings.default_engines.join(","));
    }
    println!();
    println!("Usage: search-fanout search \"query\" -e wikipedia");
    Ok(())
}

fn print_response(response: &AggregatedResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "\nSearch results for \"{}\" ({} results in {}ms):\n",
                response.query, response.total_count, response.metadata.duration_ms
            );

            for (i, result) in response.combined.iter().enumerate() {
                println!("{}. {}", i + 1, result.title);
                println!("   URL: {}", result.url);
                println!("   {}", truncate(&result.snippet, 150));
                println!();
            }

            for (key, error) in &response.metadata.errors {
                eprintln!("Engine {} failed: {}", key, error);
            }
            if let Some(error) = &response.metadata.error {
                println!("{}", error);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        OutputFormat::Compact => {
            for result in &response.combined {
                println!("{}\t{}", result.title, result.url);
            }
        }
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
