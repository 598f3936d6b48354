//! Alternate stream delivery
//!
//! A [`ProxyResolver`] turns a channel's stream descriptor into zero or more
//! alternate delivery URLs. Building those URLs and probing them is up to the
//! implementation; this module provides the trait, a resolver for deployments
//! without a proxy, and a short-lived memoising wrapper.

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::models::Channel;

/// One alternate way to play a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateStream {
    pub name: String,
    pub url: String,
}

#[async_trait]
pub trait ProxyResolver: Send + Sync {
    /// Ordered alternates for `channel`; empty when unconfigured or when the
    /// proxy fails its liveness probe
    async fn resolve(&self, channel: &Channel) -> Vec<AlternateStream>;
}

/// Resolver for deployments without a proxy
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProxyResolver;

#[async_trait]
impl ProxyResolver for DisabledProxyResolver {
    async fn resolve(&self, _channel: &Channel) -> Vec<AlternateStream> {
        Vec::new()
    }
}

struct CachedResolution {
    resolved_at: Instant,
    streams: Vec<AlternateStream>,
}

/// Memoises non-empty resolutions for a short TTL
///
/// Entries are keyed by channel identity plus stream URL, so a playlist
/// refresh that changes a channel's URL never serves the old alternates.
pub struct CachedProxyResolver<R> {
    inner: R,
    ttl: Duration,
    cache: Mutex<LruCache<String, CachedResolution>>,
}

impl<R: ProxyResolver> CachedProxyResolver<R> {
    pub fn new(inner: R, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cache_key(channel: &Channel) -> String {
        format!("{}_{}", channel.identity, channel.stream.url)
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl<R: ProxyResolver> ProxyResolver for CachedProxyResolver<R> {
    async fn resolve(&self, channel: &Channel) -> Vec<AlternateStream> {
        let key = Self::cache_key(channel);

        {
            let mut cache = self.cache.lock().await;
            let cached = cache
                .get(&key)
                .map(|entry| (entry.resolved_at.elapsed() < self.ttl, entry.streams.clone()));
            match cached {
                Some((true, streams)) => {
                    trace!("Proxy cache hit for {}", channel.identity);
                    return streams;
                }
                Some((false, _)) => {
                    cache.pop(&key);
                }
                None => {}
            }
        }

        let streams = self.inner.resolve(channel).await;
        if streams.is_empty() {
            debug!("No alternate streams for {}", channel.identity);
            return streams;
        }

        self.cache.lock().await.put(
            key,
            CachedResolution {
                resolved_at: Instant::now(),
                streams: streams.clone(),
            },
        );
        streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamDescriptor;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
        empty: bool,
    }

    #[async_trait]
    impl ProxyResolver for CountingResolver {
        async fn resolve(&self, channel: &Channel) -> Vec<AlternateStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.empty {
                return Vec::new();
            }
            vec![AlternateStream {
                name: format!("{} (Proxy)", channel.name),
                url: format!("http://proxy/hls?d={}", channel.stream.url),
            }]
        }
    }

    fn channel(identity: &str, url: &str) -> Channel {
        Channel {
            id: Channel::qualified_id(identity),
            identity: identity.to_string(),
            name: identity.to_uppercase(),
            genres: vec!["News".to_string()],
            logo: None,
            number: None,
            stream: StreamDescriptor::new(url),
            attributes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_disabled_resolver_is_empty() {
        assert!(DisabledProxyResolver.resolve(&channel("a", "http://s/a")).await.is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let resolver =
            CachedProxyResolver::new(CountingResolver::default(), Duration::from_secs(300), 10);
        let ch = channel("a", "http://s/a");

        let first = resolver.resolve(&ch).await;
        let second = resolver.resolve(&ch).await;

        assert_eq!(first, second);
        assert_eq!(first[0].name, "A (Proxy)");
        assert_eq!(resolver.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_includes_stream_url() {
        let resolver =
            CachedProxyResolver::new(CountingResolver::default(), Duration::from_secs(300), 10);

        resolver.resolve(&channel("a", "http://s/a")).await;
        resolver.resolve(&channel("a", "http://s/a-new")).await;

        assert_eq!(resolver.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cached_entries().await, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_resolved_again() {
        let resolver =
            CachedProxyResolver::new(CountingResolver::default(), Duration::from_millis(20), 10);
        let ch = channel("a", "http://s/a");

        resolver.resolve(&ch).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        resolver.resolve(&ch).await;

        assert_eq!(resolver.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let inner = CountingResolver {
            empty: true,
            ..Default::default()
        };
        let resolver = CachedProxyResolver::new(inner, Duration::from_secs(300), 10);
        let ch = channel("a", "http://s/a");

        resolver.resolve(&ch).await;
        resolver.resolve(&ch).await;

        assert_eq!(resolver.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cached_entries().await, 0);
    }
}
