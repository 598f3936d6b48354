//! Program guide ingestion and schedule queries

mod common;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use common::{GUIDE, GUIDE_URL, InMemoryFetcher, gzip};
use iptv_guide::cache::RefreshOutcome;
use iptv_guide::ingestor::{GuideEvent, ProgramGuide};
use iptv_guide::utils::time::DisplayOffset;

fn plus_one(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 1, h, m, s)
        .unwrap()
        .with_timezone(&Utc)
}

async fn loaded_guide() -> ProgramGuide {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(GUIDE_URL, gzip(GUIDE));
    let guide = ProgramGuide::new(fetcher, DisplayOffset::parse_or_default("+1:00"), 2);
    let outcome = guide.refresh(GUIDE_URL).await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Completed);
    guide
}

#[tokio::test]
async fn test_current_program_boundaries() {
    let guide = loaded_guide().await;

    let current = guide.current_program_at("rai1.it", plus_one(18, 30, 0)).await.unwrap();
    assert_eq!(current.title, "Evening News");
    assert_eq!(current.description.as_deref(), Some("Headlines of the day"));
    assert_eq!(current.category.as_deref(), Some("News"));

    assert!(guide.current_program_at("rai1.it", plus_one(17, 59, 59)).await.is_none());

    let at_start = guide.current_program_at("rai1.it", plus_one(18, 0, 0)).await.unwrap();
    assert_eq!(at_start.title, "Evening News");
    let at_stop = guide.current_program_at("rai1.it", plus_one(19, 0, 0)).await.unwrap();
    assert_eq!(at_stop.title, "Evening News");
}

#[tokio::test]
async fn test_upcoming_is_ordered_and_limited() {
    let guide = loaded_guide().await;

    let upcoming = guide.upcoming_at("rai1.it", plus_one(18, 30, 0), 2).await;
    let titles: Vec<&str> = upcoming.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Quiz Show", "Film"]);

    let one = guide.upcoming_at("rai1.it", plus_one(18, 30, 0), 1).await;
    assert_eq!(one.len(), 1);

    assert!(guide.upcoming_at("unknown", plus_one(18, 30, 0), 2).await.is_empty());
}

#[tokio::test]
async fn test_status_after_refresh() {
    let guide = loaded_guide().await;

    let status = guide.status().await;
    assert_eq!(status.channel_count, 2);
    assert_eq!(status.program_count, 4);
    assert_eq!(status.timezone, "+1:00");
    assert_ne!(status.last_update, "Never");
    assert!(!status.updating);
    assert!(guide.is_available().await);
    assert!(!guide.needs_update().await);
}

#[tokio::test]
async fn test_failed_document_is_reported_and_others_load() {
    let fetcher = InMemoryFetcher::new().into_arc();
    fetcher.serve(GUIDE_URL, GUIDE);
    fetcher.serve("http://broken.example.com/guide.xml", "<tv><programme channel=\"x\"></tv>");
    let guide = ProgramGuide::new(fetcher.clone(), DisplayOffset::default(), 100);
    let mut events = guide.subscribe();

    let spec = format!(
        "http://broken.example.com/guide.xml,{GUIDE_URL},http://down.example.com/g.xml"
    );
    guide.refresh(&spec).await.unwrap();

    let mut failed = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            GuideEvent::DocumentFailed { url, .. } => failed.push(url),
            GuideEvent::Refreshed { programs, failed_documents, .. } => {
                assert_eq!(programs, 4);
                assert_eq!(failed_documents, 2);
                break;
            }
        }
    }
    assert_eq!(
        failed,
        vec![
            "http://broken.example.com/guide.xml".to_string(),
            "http://down.example.com/g.xml".to_string()
        ]
    );
}

#[tokio::test]
async fn test_empty_spec_records_attempt() {
    let guide = ProgramGuide::new(InMemoryFetcher::new().into_arc(), DisplayOffset::default(), 100);
    assert!(guide.needs_update().await);

    assert!(guide.refresh("").await.is_err());

    assert!(guide.last_update().await.is_some());
    assert!(guide.is_empty().await);
    assert!(!guide.is_updating());
}
