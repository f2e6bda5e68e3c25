//! Caching utilities: a generic in-memory TTL/LRU [`Cache`] (used by the
//! DNS cache and as the L1 tier here), and [`TestCache`], the two-level
//! probe-verdict cache — an in-memory L1 backed by an
//! on-disk SQLite (WAL) L2.

use crate::error::Result;
use crate::types::{CacheEntry, Fingerprint, ProbeResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A single slot in the generic [`Cache`].
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
    last_accessed: Instant,
}

impl<V> Slot<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: ttl.map(|d| now + d),
            last_accessed: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// Generic in-memory cache with TTL expiry and LRU eviction on capacity.
#[derive(Debug)]
pub struct Cache<K, V> {
    storage: Arc<RwLock<HashMap<K, Slot<V>>>>,
    max_size: usize,
    default_ttl: Option<Duration>,
}

impl<K: Hash + Eq + Clone, V: Clone> Cache<K, V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            max_size,
            default_ttl: None,
        }
    }

    pub fn with_ttl(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            max_size,
            default_ttl: Some(default_ttl),
        }
    }

    pub async fn insert(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut storage = self.storage.write().await;
        let effective_ttl = ttl.or(self.default_ttl);

        storage.retain(|_, slot| !slot.is_expired());

        if storage.len() >= self.max_size && !storage.contains_key(&key) {
            if let Some(lru_key) = storage
                .iter()
                .min_by_key(|(_, slot)| slot.last_accessed)
                .map(|(k, _)| k.clone())
            {
                storage.remove(&lru_key);
            }
        }

        storage.insert(key, Slot::new(value, effective_ttl));
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut storage = self.storage.write().await;
        if let Some(slot) = storage.get_mut(key) {
            if slot.is_expired() {
                storage.remove(key);
                return None;
            }
            slot.last_accessed = Instant::now();
            return Some(slot.value.clone());
        }
        None
    }

    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }
}

/// Pragmas shared by the disk queue and the L2 test cache.
pub(crate) fn apply_sqlite_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 256i64 * 1024 * 1024)?;
    conn.pragma_update(None, "cache_size", -80_000i64)?;
    Ok(())
}

/// Two-level probe-verdict cache: L1 is an in-memory map bounded to
/// `~10k` entries with LRU eviction, L2 is a SQLite (WAL) table. A hit in
/// L2 promotes the entry into L1.
pub struct TestCache {
    l1: Arc<RwLock<HashMap<Fingerprint, (CacheEntry, Instant)>>>,
    l1_capacity: usize,
    l2: Option<Arc<Mutex<Connection>>>,
    ttl_working: Duration,
    ttl_failing: Duration,
}

impl TestCache {
    /// Open (or create) the L2 database at `path`. If `path` is `None`, the
    /// cache degrades gracefully to an L1-only, in-memory cache — consistent
    /// with this crate's "cache I/O errors degrade to a no-op" policy.
    pub fn open(
        path: Option<&Path>,
        l1_capacity: usize,
        ttl_working: Duration,
        ttl_failing: Duration,
    ) -> Self {
        let l2 = path.and_then(|p| match Self::open_l2(p) {
            Ok(conn) => Some(Arc::new(Mutex::new(conn))),
            Err(e) => {
                tracing::warn!(error = %e, "test cache L2 unavailable, degrading to L1-only");
                None
            }
        });

        Self {
            l1: Arc::new(RwLock::new(HashMap::new())),
            l1_capacity,
            l2,
            ttl_working,
            ttl_failing,
        }
    }

    fn open_l2(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_sqlite_pragmas(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS test_cache (
                fingerprint TEXT PRIMARY KEY,
                is_working INTEGER NOT NULL,
                latency_ms INTEGER,
                tested_at TEXT NOT NULL,
                strategy TEXT NOT NULL,
                failure_kind TEXT,
                ttl_secs INTEGER NOT NULL,
                success_count INTEGER NOT NULL,
                total_count INTEGER NOT NULL
            );",
        )?;
        Ok(conn)
    }

    fn ttl_for(&self, working: bool) -> Duration {
        if working {
            self.ttl_working
        } else {
            self.ttl_failing
        }
    }

    /// Look up a fingerprint: L1 first, falling back to L2 and promoting on
    /// hit. Expired entries are never returned.
    pub async fn get(&self, fp: Fingerprint) -> Option<CacheEntry> {
        {
            let l1 = self.l1.read().await;
            if let Some((entry, _)) = l1.get(&fp) {
                if entry.is_fresh(chrono::Utc::now()) {
                    return Some(entry.clone());
                }
            }
        }

        let entry = self.get_l2(fp)?;
        if !entry.is_fresh(chrono::Utc::now()) {
            return None;
        }
        self.promote(entry.clone()).await;
        Some(entry)
    }

    fn get_l2(&self, fp: Fingerprint) -> Option<CacheEntry> {
        let l2 = self.l2.as_ref()?;
        let conn = l2.lock();
        conn.query_row(
            "SELECT is_working, latency_ms, tested_at, strategy, failure_kind, ttl_secs,
                    success_count, total_count
             FROM test_cache WHERE fingerprint = ?1",
            params![fp.to_hex()],
            |row| {
                let is_working: bool = row.get(0)?;
                let latency_ms: Option<i64> = row.get(1)?;
                let tested_at: String = row.get(2)?;
                let strategy: String = row.get(3)?;
                let failure_kind: Option<String> = row.get(4)?;
                let ttl_secs: i64 = row.get(5)?;
                let success_count: i64 = row.get(6)?;
                let total_count: i64 = row.get(7)?;

                let tested_at = chrono::DateTime::parse_from_rfc3339(&tested_at)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now());

                Ok(CacheEntry {
                    fingerprint: fp,
                    last_result: crate::types::ProbeResult {
                        fingerprint: fp,
                        is_working,
                        latency_ms: latency_ms.map(|v| v as u64),
                        tested_at,
                        strategy: if strategy == "helper" {
                            crate::types::ProbeStrategy::Helper
                        } else {
                            crate::types::ProbeStrategy::Direct
                        },
                        failure_kind: failure_kind.and_then(|s| parse_failure_kind(&s)),
                    },
                    tested_at,
                    ttl_secs: ttl_secs as u64,
                    success_count: success_count as u64,
                    total_count: total_count as u64,
                })
            },
        )
        .optional()
        .ok()
        .flatten()
    }

    async fn promote(&self, entry: CacheEntry) {
        let mut l1 = self.l1.write().await;
        if l1.len() >= self.l1_capacity && !l1.contains_key(&entry.fingerprint) {
            if let Some(lru_key) = l1
                .iter()
                .min_by_key(|(_, (_, last))| *last)
                .map(|(k, _)| *k)
            {
                l1.remove(&lru_key);
            }
        }
        l1.insert(entry.fingerprint, (entry, Instant::now()));
    }

    /// Record a fresh [`ProbeResult`], updating rolling success/total
    /// counters and refreshing the TTL. Committed atomically before the
    /// result is forwarded downstream. Returns the updated entry so
    /// callers can read the fresh rolling success rate without a second
    /// lookup.
    pub async fn put(&self, result: ProbeResult) -> CacheEntry {
        let previous = self.get_l2(result.fingerprint);
        let (success_count, total_count) = match &previous {
            Some(p) => (
                p.success_count + u64::from(result.is_working),
                p.total_count + 1,
            ),
            None => (u64::from(result.is_working), 1),
        };

        let entry = CacheEntry {
            fingerprint: result.fingerprint,
            ttl_secs: self.ttl_for(result.is_working).as_secs(),
            tested_at: result.tested_at,
            last_result: result.clone(),
            success_count,
            total_count,
        };

        self.promote(entry.clone()).await;

        if let Some(l2) = &self.l2 {
            let conn = l2.lock();
            let res = conn.execute(
                "INSERT INTO test_cache
                    (fingerprint, is_working, latency_ms, tested_at, strategy, failure_kind,
                     ttl_secs, success_count, total_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                    is_working = excluded.is_working,
                    latency_ms = excluded.latency_ms,
                    tested_at = excluded.tested_at,
                    strategy = excluded.strategy,
                    failure_kind = excluded.failure_kind,
                    ttl_secs = excluded.ttl_secs,
                    success_count = excluded.success_count,
                    total_count = excluded.total_count",
                params![
                    result.fingerprint.to_hex(),
                    result.is_working,
                    result.latency_ms.map(|v| v as i64),
                    result.tested_at.to_rfc3339(),
                    match result.strategy {
                        crate::types::ProbeStrategy::Direct => "direct",
                        crate::types::ProbeStrategy::Helper => "helper",
                    },
                    result.failure_kind.map(|k| k.as_str().to_string()),
                    entry.ttl_secs as i64,
                    success_count as i64,
                    total_count as i64,
                ],
            );
            if let Err(e) = res {
                tracing::warn!(error = %e, "test cache L2 write failed, continuing with L1 only");
            }
        }

        entry
    }
}

fn parse_failure_kind(s: &str) -> Option<crate::types::FailureKind> {
    use crate::types::FailureKind::*;
    Some(match s {
        "probe_timeout" => Timeout,
        "probe_refused" => TcpRefused,
        "probe_tls" => TlsError,
        "probe_bad_status" => BadStatus,
        "probe_helper" => HelperStartupFailed,
        "invalid_response" => InvalidResponse,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fingerprint, ProbeStrategy};

    fn result(fp: Fingerprint, working: bool) -> ProbeResult {
        ProbeResult {
            fingerprint: fp,
            is_working: working,
            latency_ms: Some(42),
            tested_at: chrono::Utc::now(),
            strategy: ProbeStrategy::Direct,
            failure_kind: None,
        }
    }

    #[tokio::test]
    async fn generic_cache_expires_entries() {
        let cache: Cache<&str, u32> = Cache::with_ttl(4, Duration::from_millis(10));
        cache.insert("a", 1, None).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&"a").await, None);
    }

    #[tokio::test]
    async fn test_cache_put_then_get_is_fresh_and_matches() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache.db");
        let cache = TestCache::open(
            Some(&db),
            100,
            Duration::from_secs(7200),
            Duration::from_secs(3600),
        );
        let fp = Fingerprint([1; 16]);
        cache.put(result(fp, true)).await;

        let got = cache.get(fp).await.expect("fresh entry");
        assert!(got.is_fresh(chrono::Utc::now()));
        assert!(got.last_result.is_working);
    }

    #[tokio::test]
    async fn test_cache_l2_hit_promotes_to_l1() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache.db");
        let fp = Fingerprint([2; 16]);
        {
            let cache = TestCache::open(
                Some(&db),
                100,
                Duration::from_secs(7200),
                Duration::from_secs(3600),
            );
            cache.put(result(fp, true)).await;
        }
        // Fresh cache instance: L1 empty, must come from L2.
        let cache = TestCache::open(
            Some(&db),
            100,
            Duration::from_secs(7200),
            Duration::from_secs(3600),
        );
        let got = cache.get(fp).await;
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn rolling_stats_accumulate_across_puts() {
        let cache = TestCache::open(None, 100, Duration::from_secs(10), Duration::from_secs(10));
        let fp = Fingerprint([3; 16]);
        cache.put(result(fp, true)).await;
        cache.put(result(fp, false)).await;
        cache.put(result(fp, true)).await;
        let entry = cache.get(fp).await.unwrap();
        assert_eq!(entry.total_count, 3);
        assert_eq!(entry.success_count, 2);
    }
}
