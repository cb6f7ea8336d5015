//! Per-file cache of extraction results, keyed by `(identity, relative path)`.
//!
//! Entries are immutable and published whole behind an `Arc`, so a reader
//! sees either the previous entry or the replacement, never a mix. Writers
//! for one key are serialized by a per-key lock: a second caller that arrives
//! while the first is computing waits, then re-checks and takes the first
//! caller's result instead of parsing again.
//!
//! Successful parses are also remembered by `(language, fingerprint)`, so a
//! file that is byte-identical across two refs is parsed once even though
//! each ref has its own identity.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::types::{Chunk, FileFailure, Fingerprint, RepositoryIdentity, Symbol};

/// Cache key: snapshot identity plus path relative to the snapshot root.
type CacheKey = (RepositoryIdentity, PathBuf);

/// Everything derived from one version of one file.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Line budget `chunks` was computed with.
    pub chunk_budget: usize,
    /// Symbol-aligned chunks at `chunk_budget` (size-bounded if parsing failed).
    pub chunks: Arc<Vec<Chunk>>,
    /// Fingerprint of the bytes these results came from.
    pub fingerprint: Fingerprint,
    /// Language of the plugin that handled the file.
    pub language: Option<String>,
    /// Extracted symbols, or the per-file failure that replaced them.
    pub symbols: Result<Arc<Vec<Symbol>>, FileFailure>,
}

/// Result of a cache lookup-or-compute.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The entry now published for the key.
    pub entry: Arc<CacheEntry>,
    /// Fingerprint held for the key before this call.
    pub previous: Option<Fingerprint>,
    /// True when the published entry was reused without computing.
    pub reused: bool,
}

/// Concurrent cache store shared by every mapper in the process.
#[derive(Debug, Default)]
pub struct CacheStore {
    /// Published entries.
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    /// Single-flight locks for keys being computed right now.
    flights: DashMap<CacheKey, Arc<Mutex<()>>>,
    /// Symbols by language and content, shared across identities.
    parsed: DashMap<(String, Fingerprint), Arc<Vec<Symbol>>>,
}

impl CacheStore {
    /// Empty store.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Currently published entry for a key, regardless of freshness.
    pub fn get(&self, identity: &RepositoryIdentity, path: &Path) -> Option<Arc<CacheEntry>> {
        let key = (identity.clone(), path.to_path_buf());
        return self.entries.get(&key).map(|e| return Arc::clone(e.value()));
    }

    /// Return the entry for `fingerprint`, computing and publishing it if the
    /// stored entry is missing or was built from different bytes.
    ///
    /// `compute` runs at most once per key at a time. If it panics nothing is
    /// published and the previous entry stays visible.
    pub fn get_or_compute<F>(
        &self,
        identity: &RepositoryIdentity,
        path: &Path,
        fingerprint: &Fingerprint,
        compute: F,
    ) -> Lookup
    where
        F: FnOnce() -> CacheEntry,
    {
        let key = (identity.clone(), path.to_path_buf());
        let previous = self.entries.get(&key).map(|e| return Arc::clone(e.value()));
        if let Some(entry) = previous.as_ref().filter(|e| return &e.fingerprint == fingerprint) {
            tracing::debug!(path = %path.display(), "cache hit");
            return Lookup {
                entry: Arc::clone(entry),
                previous: Some(entry.fingerprint.clone()),
                reused: true,
            };
        }

        let flight = Arc::clone(self.flights.entry(key.clone()).or_default().value());
        let guard = flight.lock();
        let lookup = self.publish_locked(&key, path, fingerprint, previous, compute);
        drop(guard);
        self.retire_flight(&key, flight);
        return lookup;
    }

    /// Re-check and, if still stale, compute and publish. Caller holds the key's lock.
    fn publish_locked<F>(
        &self,
        key: &CacheKey,
        path: &Path,
        fingerprint: &Fingerprint,
        previous: Option<Arc<CacheEntry>>,
        compute: F,
    ) -> Lookup
    where
        F: FnOnce() -> CacheEntry,
    {
        // Another writer may have published while this one waited.
        let current = self.entries.get(key).map(|e| return Arc::clone(e.value()));
        if let Some(entry) = current.as_ref().filter(|e| return &e.fingerprint == fingerprint) {
            tracing::debug!(path = %path.display(), "cache hit after wait");
            return Lookup {
                entry: Arc::clone(entry),
                previous: previous.map(|e| return e.fingerprint.clone()),
                reused: true,
            };
        }

        tracing::debug!(path = %path.display(), stale = current.is_some(), "cache miss");
        let entry = Arc::new(compute());
        self.entries.insert(key.clone(), Arc::clone(&entry));
        return Lookup {
            entry,
            previous: current.map(|e| return e.fingerprint.clone()),
            reused: false,
        };
    }

    /// Forget the key's lock once no other caller holds or waits on it.
    fn retire_flight(&self, key: &CacheKey, flight: Arc<Mutex<()>>) {
        // Idle means only the map and `flight` reference it; cloning needs the
        // shard lock `remove_if` holds, so no waiter can appear meanwhile.
        self.flights
            .remove_if(key, |_, lock| return Arc::ptr_eq(lock, &flight) && Arc::strong_count(lock) == 2);
    }

    /// Symbols previously parsed from identical bytes by the same language.
    pub fn parsed_symbols(&self, language: &str, fingerprint: &Fingerprint) -> Option<Arc<Vec<Symbol>>> {
        let key = (language.to_string(), fingerprint.clone());
        return self.parsed.get(&key).map(|s| return Arc::clone(s.value()));
    }

    /// Remember a successful parse for reuse under other identities.
    pub fn remember_parsed(&self, language: &str, fingerprint: &Fingerprint, symbols: Arc<Vec<Symbol>>) {
        self.parsed.insert((language.to_string(), fingerprint.clone()), symbols);
    }

    /// Number of published entries.
    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    /// Whether nothing has been published.
    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }
}
