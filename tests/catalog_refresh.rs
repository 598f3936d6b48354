//! Catalog refresh lifecycle against in-memory sources
//!
//! Covers the orchestrator end to end: playlist fetch, parse, snapshot swap,
//! skip decisions and failure handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{InMemoryFetcher, PLAYLIST, PLAYLIST_URL};
use iptv_guide::cache::{CacheEvent, CacheOrchestrator, RefreshOutcome, SkipReason};
use iptv_guide::errors::AppError;
use iptv_guide::ingestor::PlaylistTransformer;
use tokio_test::{assert_err, assert_ok};

fn orchestrator(
    fetcher: Arc<InMemoryFetcher>,
    spec: &str,
    interval: Duration,
) -> CacheOrchestrator {
    CacheOrchestrator::new(PlaylistTransformer::new(fetcher), spec, interval)
}

#[tokio::test]
async fn test_refresh_builds_catalog_from_playlist() {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(PLAYLIST_URL, PLAYLIST);
    let cache = orchestrator(Arc::clone(&fetcher), PLAYLIST_URL, Duration::from_secs(3600));
    let mut events = cache.subscribe();

    let outcome = assert_ok!(cache.refresh(true).await);
    assert_eq!(outcome, RefreshOutcome::Completed);
    assert_eq!(cache.version().await, 1);

    let catalog = cache.snapshot().await;
    assert_eq!(catalog.len(), 3);
    assert_eq!(
        catalog.genres().iter().cloned().collect::<Vec<_>>(),
        vec!["News".to_string(), "Other channels".to_string()]
    );
    assert_eq!(catalog.schedule_url(), Some(common::GUIDE_URL));

    let rai1 = cache.find_channel("tv|rai1.it").await.unwrap();
    assert_eq!(rai1.number, Some(1));
    assert_eq!(rai1.stream.user_agent(), Some("HbbTV/1.6.1"));
    assert_eq!(rai1.logo.as_deref(), Some("http://logo.example.com/rai1.png"));

    let local = cache.find_channel("Local TV").await.unwrap();
    assert_eq!(local.id, "tv|Local TV");
    assert_eq!(local.genres, vec!["Other channels".to_string()]);

    match events.recv().await.unwrap() {
        CacheEvent::Updated { version, channels, genres } => {
            assert_eq!((version, channels, genres), (1, 3, 2));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_fresh_catalog_is_not_refetched() {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(PLAYLIST_URL, PLAYLIST);
    let cache = orchestrator(Arc::clone(&fetcher), PLAYLIST_URL, Duration::from_secs(3600));

    cache.refresh(false).await.unwrap();
    let second = assert_ok!(cache.refresh(false).await);

    assert_eq!(second, RefreshOutcome::Skipped(SkipReason::Fresh));
    assert_eq!(fetcher.fetches(), 1);
    assert_eq!(cache.version().await, 1);
}

#[tokio::test]
async fn test_concurrent_refreshes_run_one_cycle() {
    let fetcher = InMemoryFetcher::with_delay(Duration::from_millis(100)).into_arc();
    fetcher.serve(PLAYLIST_URL, PLAYLIST);
    let cache = orchestrator(Arc::clone(&fetcher), PLAYLIST_URL, Duration::from_secs(3600));

    let (first, second) = tokio::join!(cache.refresh(true), cache.refresh(true));
    let outcomes = [first.unwrap(), second.unwrap()];

    assert!(outcomes.contains(&RefreshOutcome::Completed));
    assert!(outcomes.contains(&RefreshOutcome::Skipped(SkipReason::InProgress)));
    assert_eq!(fetcher.fetches(), 1);
    assert!(!cache.is_refreshing());
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_catalog() {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(PLAYLIST_URL, PLAYLIST);
    let cache = orchestrator(Arc::clone(&fetcher), PLAYLIST_URL, Duration::from_secs(3600));
    cache.refresh(true).await.unwrap();

    fetcher.remove(PLAYLIST_URL);
    let result = cache.refresh(true).await;

    assert!(matches!(result, Err(AppError::AllSourcesFailed { attempted: 1, .. })));
    assert_eq!(cache.snapshot().await.len(), 3);
    assert_eq!(cache.version().await, 1);
    assert!(!cache.is_refreshing());
}

#[tokio::test]
async fn test_multiple_sources_merge_first_wins() {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(PLAYLIST_URL, PLAYLIST);
    fetcher.serve(
        "http://backup.example.com/list.m3u",
        "#EXTM3U\n#EXTINF:-1 tvg-id=\"rai1.it\" group-title=\"Backup\",Rai 1 Backup\nhttp://backup.example.com/rai1\n#EXTINF:-1 tvg-id=\"sport.it\" group-title=\"Sport\",Sport\nhttp://backup.example.com/sport\n",
    );
    let spec = format!(
        "{PLAYLIST_URL},http://backup.example.com/list.m3u,http://down.example.com/x.m3u"
    );
    let cache = orchestrator(Arc::clone(&fetcher), &spec, Duration::from_secs(3600));

    cache.refresh(true).await.unwrap();
    let catalog = cache.snapshot().await;

    assert_eq!(catalog.len(), 4);
    let rai1 = catalog.find("tv|rai1.it").unwrap();
    assert_eq!(rai1.name, "Rai 1");
    assert_eq!(rai1.stream.url, "http://stream.example.com/rai1.m3u8");
    assert!(catalog.genres().contains("Sport"));
    assert!(catalog.genres().contains("Backup"));
    assert!(catalog.by_genre("Backup").is_empty());
}

#[tokio::test]
async fn test_url_list_file_is_expanded() {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(PLAYLIST_URL, PLAYLIST);
    fetcher.serve(
        "http://provider.example.com/sources.txt",
        format!("# playlists\n{PLAYLIST_URL}\n"),
    );
    let cache = orchestrator(
        Arc::clone(&fetcher),
        "http://provider.example.com/sources.txt",
        Duration::from_secs(3600),
    );

    cache.refresh(true).await.unwrap();

    assert_eq!(cache.snapshot().await.len(), 3);
    assert_eq!(fetcher.fetches(), 2);
}

#[tokio::test]
async fn test_empty_source_spec_fails() {
    let fetcher = InMemoryFetcher::new().into_arc();
    let cache = orchestrator(fetcher, " , ", Duration::from_secs(3600));

    assert_err!(cache.refresh(true).await);

    assert!(cache.snapshot().await.is_empty());
    assert!(cache.last_updated().await.is_none());
}
