//! Boot sequence: load configuration, wire the persistence port, construct
//! the three components, and serve their HTTP surfaces concurrently
//! alongside the scheduler, outcome-feedback, and narrative-sweep background
//! tasks.

use catalyst_core::api::{self, AppState};
use catalyst_core::clock::{SessionWindows, SystemClock};
use catalyst_core::config::{Config, ConfigStore};
use catalyst_core::coordinator::collaborators::HealthCheckable;
use catalyst_core::coordinator::{Coordinator, CycleState, HttpCollaborator, OutcomeFeedback, Scheduler, StageRunner};
use catalyst_core::news::sources::{PaginatedSearchSource, RestJsonSource, RssSource};
use catalyst_core::news::{NarrativeSweep, NewsCollector, NewsSource, RateSpec};
use catalyst_core::persistence::{Pool, SqlitePersistence};
use catalyst_core::retry::BackoffPolicy;
use catalyst_core::scanner::{CatalystScanner, FakeMarketDataClient, HttpMarketDataClient, MarketDataClient};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "catalyst-core", about = "Catalyst Trading System core control plane")]
struct Cli {
    /// Path to an optional config.toml overlay.
    #[arg(long)]
    config: Option<String>,

    /// Override the coordinator's listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.coordinator_port = port;
    }
    tracing::info!(
        coordinator_port = config.coordinator_port,
        news_collector_port = config.news_collector_port,
        scanner_port = config.scanner_port,
        "booting"
    );

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("install prometheus recorder");

    let market_tz: chrono_tz::Tz = config.market_timezone.parse().expect("valid IANA timezone");

    let pool = if config.database_path == ":memory:" {
        Pool::new_in_memory(20)?
    } else {
        Pool::new(&config.database_path, 20)?
    };
    let persistence: Arc<dyn catalyst_core::persistence::PersistencePort> =
        Arc::new(SqlitePersistence::new(pool).await?);

    let config_store = Arc::new(ConfigStore::new(Duration::from_secs(60)));

    let sources: Vec<Arc<dyn NewsSource>> = build_sources(&config);
    let symbol_allowlist: BTreeSet<String> = BTreeSet::new();
    let news = Arc::new(NewsCollector::new(
        sources,
        persistence.clone(),
        config.collector_concurrency,
        market_tz,
        symbol_allowlist,
    ));
    let narratives = Arc::new(NarrativeSweep::new(persistence.clone()));

    let market_data: Arc<dyn MarketDataClient> = match std::env::var("MARKET_DATA_URL") {
        Ok(url) => Arc::new(HttpMarketDataClient::new(url, Duration::from_secs(config.api_timeout_secs))),
        Err(_) => Arc::new(FakeMarketDataClient::default()),
    };
    let scanner = Arc::new(
        CatalystScanner::new(persistence.clone(), market_data, Vec::new())
            .with_config(config_store.clone()),
    );

    let timeout = Duration::from_secs(config.api_timeout_secs);
    let pattern = Arc::new(HttpCollaborator::new(
        "pattern",
        std::env::var("PATTERN_SERVICE_URL").unwrap_or_else(|_| "http://localhost:5002".to_string()),
        timeout,
    ));
    let technical = Arc::new(HttpCollaborator::new(
        "technical",
        std::env::var("TECHNICAL_SERVICE_URL").unwrap_or_else(|_| "http://localhost:5003".to_string()),
        timeout,
    ));
    let trading = Arc::new(HttpCollaborator::new(
        "trading",
        std::env::var("TRADING_SERVICE_URL").unwrap_or_else(|_| "http://localhost:5005".to_string()),
        timeout,
    ));

    let cycle_state = Arc::new(CycleState::new());
    let runner = Arc::new(StageRunner {
        news: news.clone(),
        scanner: scanner.clone(),
        pattern: pattern.clone(),
        technical: technical.clone(),
        trading: trading.clone(),
        persistence: persistence.clone(),
        state: cycle_state.clone(),
        retry_policy: BackoffPolicy::default(),
    });

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(SystemClock),
        SessionWindows::default(),
        market_tz,
        cycle_state.clone(),
        runner.clone(),
    ));

    let collaborators: Vec<Arc<dyn HealthCheckable>> = vec![pattern.clone(), technical.clone(), trading.clone()];
    let coordinator = Arc::new(Coordinator {
        state: cycle_state.clone(),
        runner: runner.clone(),
        config: config_store.clone(),
        collaborators,
        persistence: persistence.clone(),
        scheduler: scheduler.clone(),
    });

    let state = AppState {
        coordinator: coordinator.clone(),
        news: news.clone(),
        narratives: narratives.clone(),
        scanner: scanner.clone(),
        metrics: metrics_handle,
    };

    tokio::spawn(async move { scheduler.run().await });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(catalyst_core::coordinator::feedback::FEEDBACK_INTERVAL_SECS));
        let feedback = OutcomeFeedback::new(trading, persistence.clone());
        loop {
            ticker.tick().await;
            if let Err(e) = feedback.run().await {
                tracing::warn!(error = %e, "outcome feedback sweep failed");
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            if let Err(e) = narratives.run().await {
                tracing::warn!(error = %e, "coordinated-narrative sweep failed");
            }
        }
    });

    let coordinator_addr = format!("0.0.0.0:{}", config.coordinator_port);
    let news_addr = format!("0.0.0.0:{}", config.news_collector_port);
    let scanner_addr = format!("0.0.0.0:{}", config.scanner_port);

    let coordinator_listener = tokio::net::TcpListener::bind(&coordinator_addr).await?;
    let news_listener = tokio::net::TcpListener::bind(&news_addr).await?;
    let scanner_listener = tokio::net::TcpListener::bind(&scanner_addr).await?;

    tracing::info!(%coordinator_addr, %news_addr, %scanner_addr, "serving");

    tokio::try_join!(
        axum::serve(coordinator_listener, api::coordinator_router(state.clone())),
        axum::serve(news_listener, api::news_router(state.clone())),
        axum::serve(scanner_listener, api::scanner_router(state)),
    )?;

    Ok(())
}

fn build_sources(config: &Config) -> Vec<Arc<dyn NewsSource>> {
    let mut sources: Vec<Arc<dyn NewsSource>> = Vec::new();
    let timeout = Duration::from_secs(config.api_timeout_secs);

    if let Some(key) = config.news_api_keys.get("newswire") {
        sources.push(Arc::new(RestJsonSource::new(
            "Newswire",
            1,
            "https://api.newswire.example/v1/articles",
            key.clone(),
            RateSpec::new(10.0, 1.0),
            timeout,
        )));
    }
    sources.push(Arc::new(RssSource::new(
        "BusinessWireRSS",
        2,
        "https://www.businesswire.com/portal/site/home/news/industries/feed",
        RateSpec::new(5.0, 0.5),
        timeout,
    )));
    sources.push(Arc::new(PaginatedSearchSource::new(
        "SocialSearch",
        4,
        "https://api.social-search.example/v1/search",
        RateSpec::new(20.0, 2.0),
        timeout,
    )));
    sources
}
