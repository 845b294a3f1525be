use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendError, BackendRequest};
use crate::keys::QueryKey;

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(300);
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Fresh,
    Stale,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    data: Option<serde_json::Value>,
    staleness: Staleness,
    request: Option<BackendRequest>,
    fetched_at: Option<Instant>,
    last_access: Instant,
    fetch_count: u32,
}

impl CacheEntry {
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count
    }

    fn staleness_at(&self, now: Instant, stale_time: Duration) -> Staleness {
        match (self.staleness, self.fetched_at) {
            (Staleness::Fresh, Some(at)) if now.saturating_duration_since(at) < stale_time => {
                Staleness::Fresh
            }
            _ => Staleness::Stale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub data: serde_json::Value,
    pub from_cache: bool,
}

pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    stale_time: Duration,
    gc_time: Duration,
}

impl QueryCache {
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        QueryCache {
            entries: HashMap::new(),
            stale_time,
            gc_time,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entry(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn staleness(&self, key: &QueryKey) -> Option<Staleness> {
        self.entries
            .get(key)
            .map(|e| e.staleness_at(Instant::now(), self.stale_time))
    }

    pub fn fetch(
        &mut self,
        key: QueryKey,
        request: BackendRequest,
        backend: &dyn Backend,
    ) -> Result<Fetched, BackendError> {
        self.fetch_at(key, request, backend, Instant::now())
    }

    fn fetch_at(
        &mut self,
        key: QueryKey,
        request: BackendRequest,
        backend: &dyn Backend,
        now: Instant,
    ) -> Result<Fetched, BackendError> {
        self.collect_garbage(now);

        let stale_time = self.stale_time;
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.staleness_at(now, stale_time) == Staleness::Fresh {
                if let Some(data) = entry.data.clone() {
                    entry.last_access = now;
                    debug!(key = %key, "cache hit");
                    return Ok(Fetched {
                        data,
                        from_cache: true,
                    });
                }
            }
        }

        debug!(key = %key, "cache miss");
        let result = backend.send(&request);
        let entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            data: None,
            staleness: Staleness::Stale,
            request: None,
            fetched_at: None,
            last_access: now,
            fetch_count: 0,
        });
        entry.last_access = now;
        entry.request = Some(request);
        match result {
            Ok(envelope) => {
                let data = envelope.data.unwrap_or(serde_json::Value::Null);
                entry.data = Some(data.clone());
                entry.staleness = Staleness::Fresh;
                entry.fetched_at = Some(now);
                entry.fetch_count += 1;
                Ok(Fetched {
                    data,
                    from_cache: false,
                })
            }
            Err(e) => {
                // Keep whatever we had; it stays stale so the next read retries.
                entry.staleness = Staleness::Stale;
                Err(e)
            }
        }
    }

    /// Marks every entry under `prefix` stale and returns the affected keys.
    pub fn invalidate(&mut self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut hit: Vec<QueryKey> = self
            .entries
            .iter_mut()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| {
                entry.staleness = Staleness::Stale;
                key.clone()
            })
            .collect();
        hit.sort_by_key(|k| k.to_string());
        debug!(prefix = %prefix, count = hit.len(), "invalidated");
        hit
    }

    /// Re-runs every cached query under `prefix` right away, regardless of
    /// staleness. Returns the keys that were refreshed; failures are logged
    /// and leave the entry stale.
    pub fn refetch(&mut self, prefix: &QueryKey, backend: &dyn Backend) -> Vec<QueryKey> {
        self.refetch_at(prefix, backend, Instant::now())
    }

    fn refetch_at(
        &mut self,
        prefix: &QueryKey,
        backend: &dyn Backend,
        now: Instant,
    ) -> Vec<QueryKey> {
        let mut targets: Vec<(QueryKey, BackendRequest)> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, entry)| entry.request.clone().map(|r| (key.clone(), r)))
            .collect();
        targets.sort_by_key(|(k, _)| k.to_string());

        let mut refreshed = Vec::with_capacity(targets.len());
        for (key, request) in targets {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            match backend.send(&request) {
                Ok(envelope) => {
                    entry.data = Some(envelope.data.unwrap_or(serde_json::Value::Null));
                    entry.staleness = Staleness::Fresh;
                    entry.fetched_at = Some(now);
                    entry.fetch_count += 1;
                    refreshed.push(key);
                }
                Err(e) => {
                    entry.staleness = Staleness::Stale;
                    warn!(key = %key, error = %e, "refetch failed");
                }
            }
        }
        refreshed
    }

    pub fn collect_garbage(&mut self, now: Instant) {
        let gc_time = self.gc_time;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_access) < gc_time);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "cache entries evicted");
        }
    }
}
