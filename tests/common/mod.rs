//! Shared fixtures for integration tests
//!
//! [`InMemoryFetcher`] stands in for the network: URLs map to canned bodies,
//! unknown URLs fail like an unreachable host, and every fetch is counted.

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iptv_guide::errors::{AppError, AppResult, FetchError};
use iptv_guide::utils::SourceFetcher;

#[derive(Default)]
pub struct InMemoryFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn serve(&self, url: &str, body: impl AsRef<[u8]>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.as_ref().to_vec());
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl SourceFetcher for InMemoryFetcher {
    async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let body = self.bodies.lock().unwrap().get(url).cloned();
        body.ok_or_else(|| AppError::from(FetchError::network(url, "connection refused")))
    }
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub const PLAYLIST_URL: &str = "http://provider.example.com/playlist.m3u";
pub const GUIDE_URL: &str = "http://provider.example.com/guide.xml.gz";

pub const PLAYLIST: &str = r#"#EXTM3U url-tvg="http://provider.example.com/guide.xml.gz"
#EXTINF:-1 tvg-id="rai1.it" tvg-chno="1" tvg-logo="http://logo.example.com/rai1.png" group-title="News",Rai 1
#EXTVLCOPT:http-user-agent=HbbTV/1.6.1
http://stream.example.com/rai1.m3u8
#EXTINF:-1 tvg-id="rai2.it" tvg-chno="2" group-title="News",Rai 2
http://stream.example.com/rai2.m3u8
#EXTINF:-1,Local TV
http://stream.example.com/local.ts
"#;

pub const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="rai1.it"><display-name>Rai 1</display-name></channel>
  <programme start="20240101180000 +0100" stop="20240101190000 +0100" channel="rai1.it">
    <title>Evening News</title>
    <desc>Headlines of the day</desc>
    <category>News</category>
  </programme>
  <programme start="20240101190000 +0100" stop="20240101203000 +0100" channel="rai1.it">
    <title>Quiz Show</title>
  </programme>
  <programme start="20240101203000 +0100" stop="20240101223000 +0100" channel="rai1.it">
    <title>Film</title>
  </programme>
  <programme start="20240101210000 +0100" stop="20240101220000 +0100" channel="rai2.it">
    <title>Documentary</title>
  </programme>
</tv>"#;
