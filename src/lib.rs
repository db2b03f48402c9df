pub mod api;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
pub use config::Config;
use models::image::PageSelector;
use scheduler::Scheduler;
use services::SearchRequest;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let mut log_level = config.general.log_level.clone();
    if config.general.suppress_connection_errors {
        log_level.push_str(",reqwest::retry=off,hyper_util=off");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "pixelarr")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "daemon" | "-d" | "--daemon" => run_daemon(config, prometheus_handle).await,

        "search" | "s" => {
            if args.len() < 3 {
                println!("Usage: pixelarr search <query>");
                println!("Example: pixelarr search \"mountain lake\"");
                return Ok(());
            }
            let query = args[2..].join(" ");
            cmd_search(config, &query).await
        }

        "sweep" => cmd_sweep(config).await,

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Pixelarr - Image Search Aggregator");
    println!("Unified search across Unsplash, Pexels and Pixabay");
    println!();
    println!("USAGE:");
    println!("  pixelarr <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  search <query>    Run a one-off aggregated search");
    println!("  sweep             Run the retention sweep and cache eviction once");
    println!("  daemon            Run the API server with the background scheduler");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  pixelarr search \"northern lights\"   # Query all providers");
    println!("  pixelarr daemon                     # Start the service");
    println!("  pixelarr sweep                      # One-off maintenance pass");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure provider keys, limits, etc.");
    println!("  Provider keys may also come from UNSPLASH_ACCESS_KEY,");
    println!("  PEXELS_API_KEY and PIXABAY_API_KEY environment variables.");
}

async fn cmd_search(config: Config, query: &str) -> anyhow::Result<()> {
    println!("Searching for: {}", query);

    let per_page = config.search.default_per_page;
    let state = SharedState::new(config).await?;

    let request = SearchRequest {
        query: query.to_string(),
        page: PageSelector::default(),
        per_page,
        user_id: None,
    };

    let response = state.search_service.search(&request).await?;

    if response.images.is_empty() {
        println!("No images found for '{}'", query);
        return Ok(());
    }

    println!();
    println!("Results ({} images):", response.images.len());
    println!("{:-<70}", "");

    for image in &response.images {
        let label = if image.alt.is_empty() {
            &image.id
        } else {
            &image.alt
        };
        println!("• [{}] {}", image.provider, label);
        println!("  {}", image.url);
        if !image.credit.is_empty() {
            println!("  by {}", image.credit);
        }
    }

    println!();
    println!("Provider totals:");
    for (provider, stat) in &response.pagination.provider_stats {
        println!("  {}: {} returned of {} total", provider, stat.count, stat.total);
    }

    if response.pagination.has_next_page {
        println!();
        println!("More pages available.");
    }

    Ok(())
}

async fn cmd_sweep(config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    let sweep = state.sweep_service.run_retention_sweep().await?;
    let eviction = state.sweep_service.run_cache_eviction().await?;

    println!("Sweep complete.");
    println!("  Request records deleted: {}", sweep.requests_deleted);
    println!("  Idle windows deleted:    {}", sweep.windows_deleted);
    println!(
        "  Cache entries evicted:   {} expired, {} trimmed",
        eviction.expired, eviction.trimmed
    );

    Ok(())
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Pixelarr v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let shared = Arc::new(SharedState::new(config.clone()).await?);
    let api_state = api::create_app_state(Arc::clone(&shared), prometheus_handle);

    let scheduler = Scheduler::new(Arc::clone(&shared), config.scheduler.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("Scheduler error: {}", e);
        }
    });

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(api_state);
        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        Some(tokio::spawn(async move {
            info!("🌐 Web Server running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler_handle.abort();
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("Daemon stopped");

    Ok(())
}
