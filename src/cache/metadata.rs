//! Cache of parsed per-series metadata, keyed by (resource, series).

use crate::cache::{CacheConfig, CacheStats, LoadingCache};
use crate::error::Result;
use crate::model::SeriesPath;
use crate::read::{ResourceProvider, SeriesMetadata};
use crate::resource::{FileResource, ResourceId};
use std::sync::Arc;

/// Bounded cache from `(resource, series)` to parsed [`SeriesMetadata`].
///
/// Closed resources are immutable, so an entry never goes stale; it leaves
/// the cache only through LRU eviction or [`invalidate_resource`]
/// (called when a resource is deleted or merged away).
///
/// [`invalidate_resource`]: SeriesMetadataCache::invalidate_resource
pub struct SeriesMetadataCache {
    inner: LoadingCache<(ResourceId, SeriesPath), SeriesMetadata>,
}

impl SeriesMetadataCache {
    /// Creates a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: LoadingCache::new(config),
        }
    }

    /// Returns the series metadata for `(resource, series)`, loading it
    /// through the provider on a miss. Concurrent callers for the same
    /// missing key share a single load.
    pub fn get_or_load(
        &self,
        resource: &FileResource,
        series: &SeriesPath,
        provider: &dyn ResourceProvider,
    ) -> Result<Arc<SeriesMetadata>> {
        self.inner
            .get_or_load((resource.id(), series.clone()), || {
                provider.load_series_metadata(resource, series)
            })
    }

    /// Removes every entry belonging to the resource. Returns the number of
    /// entries removed; never partially invalidates a resource.
    pub fn invalidate_resource(&self, resource_id: ResourceId) -> usize {
        self.inner.invalidate_where(|(id, _)| *id == resource_id)
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the cache counters.
    pub fn stats(&self) -> &CacheStats {
        self.inner.stats()
    }
}
