//! Cache of decoded chunk data, keyed by (resource, chunk locator).

use crate::cache::{CacheConfig, CacheStats, LoadingCache};
use crate::error::Result;
use crate::read::{ChunkData, ChunkLocator, ResourceProvider};
use crate::resource::{FileResource, ResourceId};
use std::sync::Arc;

/// Bounded cache from `(resource, locator)` to decoded [`ChunkData`].
///
/// Chunk payloads dominate read-path memory, so this cache is usually
/// configured with a byte budget rather than an entry count. Entries are
/// immutable once loaded and leave only through LRU eviction or
/// [`invalidate_resource`](ChunkCache::invalidate_resource).
pub struct ChunkCache {
    inner: LoadingCache<(ResourceId, ChunkLocator), ChunkData>,
}

impl ChunkCache {
    /// Creates a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: LoadingCache::new(config),
        }
    }

    /// Returns the decoded chunk for `(resource, locator)`, loading it
    /// through the provider on a miss. Concurrent callers for the same
    /// missing key share a single load.
    pub fn get_or_load(
        &self,
        resource: &FileResource,
        locator: &ChunkLocator,
        provider: &dyn ResourceProvider,
    ) -> Result<Arc<ChunkData>> {
        self.inner.get_or_load((resource.id(), *locator), || {
            provider.load_chunk(resource, locator)
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
