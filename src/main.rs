use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_guide::{
    cache::CacheOrchestrator,
    config::Config,
    ingestor::{GuideSchedule, PlaylistTransformer, ProgramGuide, RefreshScheduler},
    proxy::{CachedProxyResolver, DisabledProxyResolver, ProxyResolver},
    services::{CatalogQuery, CatalogService},
    utils::{SourceFetcher, StandardHttpClient, time::DisplayOffset},
};

#[derive(Parser)]
#[command(name = "iptv-guide")]
#[command(version)]
#[command(about = "Live-TV playlist and program guide ingestion service")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Playlist source: URL, comma-separated URLs, or URL of a list file
    #[arg(short = 'p', long, value_name = "URL")]
    playlist_url: Option<String>,

    /// Guide source (overrides the URL declared by the playlist)
    #[arg(short = 'e', long, value_name = "URL")]
    epg_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Refresh catalog and guide once, print a JSON summary and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("iptv_guide={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting IPTV guide service v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(playlist_url) = cli.playlist_url {
        config.sources.playlist_url = playlist_url;
    }
    if let Some(epg_url) = cli.epg_url {
        config.sources.epg_url = Some(epg_url);
    }

    let display_offset = DisplayOffset::parse_or_default(&config.epg.timezone_offset);
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(
        StandardHttpClient::new(
            config.http.fetch_timeout,
            &config.http.user_agent,
        )
        .context("Failed to build HTTP client")?,
    );

    let cache = Arc::new(CacheOrchestrator::new(
        PlaylistTransformer::new(Arc::clone(&fetcher)),
        config.sources.playlist_url.clone(),
        config.cache.update_interval,
    ));
    let guide = config.epg.enabled.then(|| {
        Arc::new(ProgramGuide::new(
            Arc::clone(&fetcher),
            display_offset,
            config.epg.batch_size,
        ))
    });
    if guide.is_none() {
        info!("Program guide disabled");
    }

    if let Err(e) = cache.refresh(true).await {
        error!("Initial catalog refresh failed: {}", e);
    }

    if cli.once {
        return run_once(&cache, guide.as_deref(), &config).await;
    }

    let proxy: Arc<dyn ProxyResolver> = Arc::new(CachedProxyResolver::new(
        DisabledProxyResolver,
        config.proxy.cache_ttl,
        config.proxy.cache_capacity,
    ));
    let service = CatalogService::new(
        Arc::clone(&cache),
        guide.clone(),
        proxy,
        config.proxy.force_proxy,
    );
    let first_page = service.catalog(&CatalogQuery::default()).await;
    info!(
        "Catalog ready: {} channels on the first page, {} genres",
        first_page.metas.len(),
        first_page.genres.len()
    );

    let guide_task = match guide {
        Some(guide) => {
            let schedule =
                GuideSchedule::new(&config.epg.update_cron, config.sources.epg_url.clone())
                    .context("Invalid guide schedule")?;
            Some((guide, schedule))
        }
        None => None,
    };

    let scheduler =
        RefreshScheduler::start(Arc::clone(&cache), guide_task, CancellationToken::new());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    scheduler.shutdown().await;
    info!("IPTV guide service stopped");
    Ok(())
}

async fn run_once(
    cache: &CacheOrchestrator,
    guide: Option<&ProgramGuide>,
    config: &Config,
) -> Result<()> {
    let guide_status = match guide {
        Some(guide) => {
            match cache.effective_epg_url(config.sources.epg_url.as_deref()).await {
                Some(url) => {
                    if let Err(e) = guide.refresh(&url).await {
                        error!("Guide refresh failed: {}", e);
                    }
                }
                None => warn!("No guide URL configured or declared by the playlist"),
            }
            Some(guide.status().await)
        }
        None => None,
    };

    let state = cache.state().await;
    let catalog = &state.snapshot;
    let summary = serde_json::json!({
        "catalog": {
            "version": state.version,
            "channels": catalog.len(),
            "genres": catalog.genres(),
            "schedule_url": catalog.schedule_url(),
            "built_at": catalog.built_at(),
            "last_updated": state.last_updated,
        },
        "guide": guide_status,
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
