//! A small shared DNS cache (≤1000 entries, 5 minute TTL) used by both the
//! fetcher's connection pool and the GeoIP enricher.

use crate::cache::Cache;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::lookup_host;

const DNS_CACHE_CAPACITY: usize = 1000;
const DNS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Resolves hostnames to IP addresses, caching successful lookups.
pub struct DnsCache {
    cache: Cache<String, IpAddr>,
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::with_ttl(DNS_CACHE_CAPACITY, DNS_CACHE_TTL),
        }
    }

    /// Resolve `host` to a single IP address, preferring a cached value.
    pub async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }

        if let Some(ip) = self.cache.get(&host.to_string()).await {
            return Some(ip);
        }

        let addr = format!("{host}:0");
        let mut addrs = lookup_host(addr).await.ok()?;
        let ip = addrs.next()?.ip();
        self.cache.insert(host.to_string(), ip, None).await;
        Some(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ip_resolves_without_lookup() {
        let dns = DnsCache::new();
        let ip = dns.resolve("198.51.100.10").await;
        assert_eq!(ip, Some("198.51.100.10".parse().unwrap()));
    }
}
