//! Disk Queue: a durable, crash-safe FIFO of pending [`Candidate`]s
//! keyed by fingerprint, backed by SQLite. Keeps memory flat once the
//! candidate count outgrows what's comfortable to hold in RAM, and lets a
//! killed run resume without re-enqueuing already-acked work.
//!
//! Single-writer discipline: only the orchestrator enqueues/acks; the
//! prober pool only dequeues. SQLite's WAL mode gives the reader
//! concurrency that discipline needs.

use crate::cache::apply_sqlite_pragmas;
use crate::error::{Error, Result};
use crate::types::{Candidate, Fingerprint};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct DiskQueue {
    conn: Mutex<Connection>,
}

impl DiskQueue {
    /// Open (creating if absent) the queue database at `path`, applying the
    /// same WAL pragmas as the test cache.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_sqlite_pragmas(&conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS queue (
                fingerprint TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                acked INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_queue_unacked ON queue(acked, seq)",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory queue, used for retest mode and tests where durability
    /// across process restarts is not required.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_sqlite_pragmas(&conn)?;
        conn.execute(
            "CREATE TABLE queue (
                fingerprint TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                acked INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Enqueue a batch of candidates. Re-enqueuing a fingerprint already
    /// present (acked or not) is a no-op for that item — the queue is keyed
    /// by fingerprint, not by insertion.
    pub fn enqueue(&self, batch: &[Candidate]) -> Result<usize> {
        let conn = self.conn.lock();
        let mut inserted = 0usize;
        for candidate in batch {
            let payload = serde_json::to_string(candidate)?;
            let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM queue", [], |r| r.get(0))?;
            let changed = conn.execute(
                "INSERT OR IGNORE INTO queue (fingerprint, seq, payload, acked) VALUES (?1, ?2, ?3, 0)",
                params![candidate.fingerprint.to_hex(), seq, payload],
            )?;
            inserted += changed;
        }
        Ok(inserted)
    }

    /// Dequeue up to `n` un-acked candidates, oldest first. Dequeuing does
    /// not remove or mark them acked — the caller must call [`Self::ack`]
    /// once the item has been durably handed to the prober, otherwise a
    /// crash before acking redelivers it on the next open.
    pub fn dequeue(&self, n: usize) -> Result<Vec<Candidate>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM queue WHERE acked = 0 ORDER BY seq ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![n as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::with_capacity(n);
        for row in rows {
            let payload = row?;
            let candidate: Candidate = serde_json::from_str(&payload)
                .map_err(|e| Error::queue(format!("corrupt queue row: {e}")))?;
            out.push(candidate);
        }
        Ok(out)
    }

    pub fn ack(&self, fingerprint: Fingerprint) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE queue SET acked = 1 WHERE fingerprint = ?1",
            params![fingerprint.to_hex()],
        )?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue WHERE acked = 0", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Whether a fingerprint exists in the queue at all (acked or not) —
    /// used by the orchestrator to avoid re-enqueuing work from a prior run.
    pub fn contains(&self, fingerprint: Fingerprint) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM queue WHERE fingerprint = ?1",
                params![fingerprint.to_hex()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
