//! Canonicaliser + Deduper: turns [`ParsedFields`] into a stable
//! [`Fingerprint`] and filters a candidate stream down to one representative
//! per fingerprint.
//!
//! The fingerprint is a BLAKE3 digest over the fields that make two proxy
//! links "the same server", deliberately excluding cosmetic fields like
//! `remarks` so that two subscriptions naming the same endpoint differently
//! still dedupe.

use crate::parsers::ParsedFields;
use crate::types::{Candidate, Fingerprint};
use std::collections::HashSet;

/// Compute the dedup/cache key for a not-yet-fingerprinted candidate.
///
/// Hashed in order: protocol tag, lowercased host, port, raw auth bytes,
/// then transport params and TLS params sorted by key so that map
/// iteration order never perturbs the digest.
pub fn fingerprint(fields: &ParsedFields) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(fields.protocol.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(fields.host.to_ascii_lowercase().as_bytes());
    hasher.update(b"\0");
    hasher.update(&fields.port.to_be_bytes());
    hasher.update(b"\0");
    hasher.update(&fields.auth);

    hash_sorted_map(&mut hasher, &fields.transport_params);
    hash_sorted_map(&mut hasher, &fields.tls_params);

    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    Fingerprint(bytes)
}

fn hash_sorted_map(hasher: &mut blake3::Hasher, map: &std::collections::HashMap<String, String>) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (k, v) in entries {
        hasher.update(b"\0");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
}

/// Deduper: keeps the first candidate seen for each fingerprint, dropping
/// later duplicates. Stable — first-seen wins regardless of source order
/// changes between runs with the same input.
#[derive(Debug, Default)]
pub struct Deduper {
    seen: HashSet<Fingerprint>,
}

impl Deduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records the fingerprint) the first time a
    /// fingerprint is seen; `false` on every subsequent occurrence.
    pub fn accept(&mut self, candidate: &Candidate) -> bool {
        self.seen.insert(candidate.fingerprint)
    }

    pub fn dedupe(&mut self, candidates: Vec<Candidate>) -> (Vec<Candidate>, usize) {
        let mut unique = Vec::with_capacity(candidates.len());
        let mut dropped = 0usize;
        for candidate in candidates {
            if self.accept(&candidate) {
                unique.push(candidate);
            } else {
                dropped += 1;
            }
        }
        (unique, dropped)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
