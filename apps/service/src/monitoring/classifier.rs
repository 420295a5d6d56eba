//! Local-vs-public classification of probe targets.
//!
//! The verdict decides whether certificate verification is skipped for a
//! probe, so the only ways to obtain "local" are:
//! - a literal loopback / private / link-local IP address,
//! - the `localhost` name,
//! - a hostname whose *every* resolved address is loopback / private / link-local.
//!
//! Resolution failures classify as public and are never cached.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::{Host, Url};

/// Default lifetime of a cached hostname verdict
pub const DEFAULT_DNS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Resolves a hostname to its full address set
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    is_local: bool,
    expires_at: Instant,
}

/// Hostname verdict cache with a fixed TTL.
///
/// Concurrent misses on the same hostname may each resolve and insert; the
/// verdict is idempotent so the last writer wins harmlessly.
#[derive(Debug)]
pub struct DnsCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    /// Cached verdict for `host`, if present and not expired
    pub async fn get(&self, host: &str) -> Option<bool> {
        let entries = self.entries.read().await;
        entries
            .get(host)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.is_local)
    }

    /// Store a verdict, dropping whatever has expired meanwhile
    pub async fn insert(&self, host: &str, is_local: bool) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(host.to_string(), CacheEntry { is_local, expires_at: now + self.ttl });
    }

    /// Number of entries, expired ones not yet evicted included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_CACHE_TTL)
    }
}

/// Decides whether a probe target lives entirely on a private network
pub struct NetworkClassifier {
    resolver: Arc<dyn HostResolver>,
    cache: DnsCache,
}

impl NetworkClassifier {
    /// Classifier using the system resolver
    pub fn new(ttl: Duration) -> Self {
        Self::with_resolver(Arc::new(SystemResolver), DnsCache::new(ttl))
    }

    pub fn with_resolver(resolver: Arc<dyn HostResolver>, cache: DnsCache) -> Self {
        Self { resolver, cache }
    }

    pub fn cache(&self) -> &DnsCache {
        &self.cache
    }

    /// Classify the host of `url`. URLs without a host are public.
    pub async fn is_local(&self, url: &Url) -> bool {
        match url.host() {
            Some(Host::Ipv4(ip)) => is_local_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => is_local_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => self.is_local_host(domain).await,
            None => false,
        }
    }

    /// Classify a bare hostname or IP literal
    pub async fn is_local_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_local_ip(ip);
        }

        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host == "localhost" {
            return true;
        }

        if let Some(is_local) = self.cache.get(&host).await {
            return is_local;
        }

        let addrs = match self.resolver.resolve(&host).await {
            Ok(addrs) if !addrs.is_empty() => addrs,
            Ok(_) => {
                warn!(host = %host, "Resolver returned no addresses, treating host as public");
                return false;
            }
            Err(e) => {
                warn!(host = %host, "DNS resolution failed, treating host as public: {}", e);
                return false;
            }
        };

        let is_local = addrs.iter().all(|ip| is_local_ip(*ip));
        debug!(host = %host, addresses = addrs.len(), is_local, "Classified probe target");

        self.cache.insert(&host, is_local).await;
        is_local
    }
}

/// Loopback, RFC 1918 / unique-local, or link-local
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_ipv4(v4),
            None => is_local_ipv6(v6),
        },
    }
}

fn is_local_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local()
}

fn is_local_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
