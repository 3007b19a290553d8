//! Persistent cache of decoded (and coarsened) scene rasters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use goes_common::{GeometryTable, Raster, SceneRequest};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::codec::{decode_entry, encode_entry, CacheEntry, CacheEntryMeta};
use crate::error::{CacheError, CacheResult};
use crate::object_store::BlobStore;

/// Snapshot of cache counters.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries found but rejected and removed.
    pub corrupt: u64,
    pub writes: u64,
    /// Stores skipped because an identical entry was already present.
    pub unchanged: u64,
    pub write_errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
    writes: AtomicU64,
    unchanged: AtomicU64,
    write_errors: AtomicU64,
}

/// Scene rasters keyed by [`SceneRequest::cache_key`].
///
/// Entries are validated on every lookup against the key they were stored
/// under and the shape the geometry table expects; anything that fails is
/// removed and reported as a miss so the scene is fetched again.
#[derive(Debug, Clone)]
pub struct SceneCache {
    blobs: BlobStore,
    geometry: GeometryTable,
    counters: Arc<Counters>,
}

impl SceneCache {
    pub fn new(blobs: BlobStore, geometry: GeometryTable) -> Self {
        Self {
            blobs,
            geometry,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn geometry(&self) -> &GeometryTable {
        &self.geometry
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Return the cached raster for a request, or `None` on a miss.
    ///
    /// Never fails: storage errors and invalid entries are misses.
    #[instrument(skip(self), fields(key = %request.cache_key()))]
    pub async fn lookup(&self, request: &SceneRequest) -> Option<CacheEntry> {
        let key = request.cache_key();

        let bytes = match self.blobs.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.record_miss();
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Cache read failed, treating as miss");
                self.record_miss();
                return None;
            }
        };

        match self.validate(request, &key, &bytes) {
            Ok(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                counter!("goes_cache_hits_total").increment(1);
                debug!("Cache hit");
                Some(entry)
            }
            Err(e) => {
                warn!(error = %e, "Discarding invalid cache entry");
                self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                counter!("goes_cache_corrupt_total").increment(1);
                if let Err(e) = self.blobs.delete(&key).await {
                    warn!(error = %e, "Failed to remove invalid cache entry");
                }
                self.record_miss();
                None
            }
        }
    }

    /// Persist a raster for a request.
    ///
    /// Storing the same raster twice leaves the entry untouched. Concurrent
    /// stores of one key each write a complete blob; the last one wins.
    #[instrument(skip(self, raster, source_scene_id), fields(key = %request.cache_key()))]
    pub async fn store(
        &self,
        request: &SceneRequest,
        raster: &Raster,
        source_scene_id: Option<String>,
    ) -> CacheResult<()> {
        let key = request.cache_key();
        let expected = self.geometry.expected_shape(request);
        if raster.shape() != expected {
            return Err(self.write_failed(CacheError::Write(format!(
                "refusing to cache {} raster under {}, expected {}",
                raster.shape(),
                key,
                expected
            ))));
        }

        if let Ok(Some(existing)) = self.blobs.get(&key).await {
            if let Ok(entry) = self.validate(request, &key, &existing) {
                if entry.raster.bitwise_eq(raster) {
                    self.counters.unchanged.fetch_add(1, Ordering::Relaxed);
                    debug!("Identical entry already cached");
                    return Ok(());
                }
            }
        }

        let meta = CacheEntryMeta::new(key.clone(), raster.shape(), source_scene_id);
        let bytes = encode_entry(&meta, raster).map_err(|e| self.write_failed(e))?;
        self.blobs
            .put(&key, bytes)
            .await
            .map_err(|e| self.write_failed(e))?;

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Cached scene");
        Ok(())
    }

    /// Remove an entry. Missing entries are ignored.
    pub async fn evict(&self, request: &SceneRequest) -> CacheResult<()> {
        self.blobs.delete(&request.cache_key()).await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            corrupt: self.counters.corrupt.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            unchanged: self.counters.unchanged.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
        }
    }

    fn validate(&self, request: &SceneRequest, key: &str, bytes: &[u8]) -> CacheResult<CacheEntry> {
        let entry = decode_entry(bytes)?;
        if entry.meta.key != key {
            return Err(CacheError::Codec(format!(
                "entry belongs to {}, not {}",
                entry.meta.key, key
            )));
        }
        let expected = self.geometry.expected_shape(request);
        if entry.raster.shape() != expected {
            return Err(CacheError::Codec(format!(
                "entry shape {} does not match expected {}",
                entry.raster.shape(),
                expected
            )));
        }
        Ok(entry)
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("goes_cache_misses_total").increment(1);
    }

    fn write_failed(&self, err: CacheError) -> CacheError {
        self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
        counter!("goes_cache_write_errors_total").increment(1);
        match err {
            CacheError::Write(_) => err,
            other => CacheError::Write(other.to_string()),
        }
    }
}
