//! GeoIP Enricher: offline MMDB City lookups. A missing or unusable
//! database degrades to empty geo fields rather than dropping the
//! candidate — geolocation is enrichment, not a gate.

use crate::dns::DnsCache;
use maxminddb::geoip2;
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct GeoInfo {
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub asn: Option<u32>,
}

pub struct GeoIpEnricher {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
    dns: DnsCache,
}

impl GeoIpEnricher {
    /// Opens the MMDB at `path`. Any failure (missing file, bad format)
    /// logs a warning and leaves the enricher in a pass-through mode that
    /// always returns empty [`GeoInfo`].
    pub fn open(path: &Path, dns: DnsCache) -> Self {
        let reader = match maxminddb::Reader::open_readfile(path) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "GeoIP database unavailable, enrichment disabled");
                None
            }
        };
        Self { reader, dns }
    }

    pub fn disabled(dns: DnsCache) -> Self {
        Self { reader: None, dns }
    }

    /// Resolve `host` via the shared DNS cache and look it up in the MMDB.
    /// Returns empty fields on any failure along the way.
    pub async fn lookup(&self, host: &str) -> GeoInfo {
        let Some(reader) = &self.reader else {
            return GeoInfo::default();
        };

        let ip = match self.dns.resolve(host).await {
            Some(ip) => ip,
            None => return GeoInfo::default(),
        };

        self.lookup_ip(reader, ip)
    }

    fn lookup_ip(&self, reader: &maxminddb::Reader<Vec<u8>>, ip: IpAddr) -> GeoInfo {
        match reader.lookup::<geoip2::City>(ip) {
            Ok(city) => GeoInfo {
                country_code: city
                    .country
                    .as_ref()
                    .and_then(|c| c.iso_code)
                    .map(String::from),
                country: city
                    .country
                    .as_ref()
                    .and_then(|c| c.names.as_ref())
                    .and_then(|names| names.get("en"))
                    .map(|s| s.to_string()),
                city: city
                    .city
                    .as_ref()
                    .and_then(|c| c.names.as_ref())
                    .and_then(|names| names.get("en"))
                    .map(|s| s.to_string()),
                asn: None,
            },
            Err(_) => GeoInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_database_degrades_to_empty_geoinfo() {
        let enricher = GeoIpEnricher::open(Path::new("/nonexistent/GeoLite2-City.mmdb"), DnsCache::new());
        let info = enricher.lookup("example.com").await;
        assert!(info.country_code.is_none());
        assert!(info.asn.is_none());
    }

    #[tokio::test]
    async fn disabled_enricher_is_always_empty() {
        let enricher = GeoIpEnricher::disabled(DnsCache::new());
        let info = enricher.lookup("203.0.113.5").await;
        assert!(info.country.is_none());
    }
}
