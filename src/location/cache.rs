//! Address cache for reverse-geocoded coordinates.
//!
//! File-backed at ~/.souq/address-cache.json by default. Case-insensitive
//! keys, per-lookup maximum age, best-effort persistence.

use super::types::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cache collaborator injected into the resolver.
pub trait AddressCache: Send + Sync {
    /// The cached address for `key` if it is at most `max_age` old.
    fn get(&self, key: &str, max_age: Duration) -> Option<String>;
    fn put(&self, key: &str, address: &str);
}

/// Cache key for a coordinate: three decimals, roughly 110 m.
pub fn coordinate_key(coordinate: &Coordinate) -> String {
    format!("{:.3},{:.3}", coordinate.latitude(), coordinate.longitude())
}

/// Entries older than this are dropped unless a TTL is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Serialize, Deserialize, Clone)]
struct CacheEntry {
    address: String,
    timestamp: i64,
}

struct Entries {
    map: HashMap<String, CacheEntry>,
    generation: u64,
}

/// Writes snapshots to disk; a snapshot older than the last one written is skipped.
struct Writer {
    path: PathBuf,
    written: Mutex<u64>,
}

impl Writer {
    fn write(&self, generation: u64, snapshot: &HashMap<String, CacheEntry>) {
        let Ok(mut written) = self.written.lock() else {
            return;
        };
        if generation <= *written {
            return;
        }

        let json = match serde_json::to_string_pretty(snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialise address cache");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let tmp = self.path.with_extension("json.tmp");
        match fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &self.path)) {
            Ok(()) => *written = generation,
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to persist address cache"),
        }
    }
}

pub struct FileAddressCache {
    entries: Mutex<Entries>,
    writer: Arc<Writer>,
    ttl: Duration,
}

impl FileAddressCache {
    /// Load from the default location (~/.souq/address-cache.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load from a specific path. A missing or corrupt file starts empty;
    /// entries older than [`DEFAULT_TTL`] are dropped.
    pub fn load_from(path: PathBuf) -> Self {
        let map = Self::read_file(&path).unwrap_or_default();
        let cache = Self {
            entries: Mutex::new(Entries { map, generation: 0 }),
            writer: Arc::new(Writer {
                path,
                written: Mutex::new(0),
            }),
            ttl: DEFAULT_TTL,
        };
        cache.prune();
        cache
    }

    /// Retention period for entries; anything older is dropped now and on
    /// every later `put`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self.prune();
        self
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".souq")
            .join("address-cache.json")
    }

    fn read_file(path: &Path) -> Option<HashMap<String, CacheEntry>> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    fn prune(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let cutoff = now_millis().saturating_sub(millis(self.ttl));
            entries.map.retain(|_, entry| entry.timestamp >= cutoff);
        }
    }

    /// Hand a snapshot to the writer. Inside a tokio runtime the file I/O
    /// runs on the blocking pool.
    fn persist(&self, generation: u64, snapshot: HashMap<String, CacheEntry>) {
        let writer = Arc::clone(&self.writer);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || writer.write(generation, &snapshot));
            }
            Err(_) => writer.write(generation, &snapshot),
        }
    }

    /// Number of entries held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl AddressCache for FileAddressCache {
    fn get(&self, key: &str, max_age: Duration) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.map.get(&key.to_lowercase())?;

        if now_millis() - entry.timestamp > millis(max_age) {
            return None; // expired
        }
        Some(entry.address.clone())
    }

    fn put(&self, key: &str, address: &str) {
        let now = now_millis();
        let (generation, snapshot) = {
            let Ok(mut entries) = self.entries.lock() else {
                return;
            };
            let cutoff = now.saturating_sub(millis(self.ttl));
            entries.map.retain(|_, entry| entry.timestamp >= cutoff);
            entries.map.insert(
                key.to_lowercase(),
                CacheEntry {
                    address: address.to_string(),
                    timestamp: now,
                },
            );
            entries.generation += 1;
            (entries.generation, entries.map.clone())
        };
        self.persist(generation, snapshot);
    }
}
