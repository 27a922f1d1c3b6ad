//! K-way merge of per-resource point streams with version tie-breaking and
//! deletion suppression.
//!
//! One cursor per selected resource produces points in ascending timestamp
//! order (guaranteed within a resource by construction). Cursors are merged
//! through a priority heap ordered by (timestamp ascending, merge priority
//! descending): at a duplicate timestamp the highest-priority resource wins
//! and the losers' points are consumed and dropped.
//!
//! Merge priority models "most recently written overrides": unsequence
//! resources carry their explicit version, sequence resources are treated
//! as version 0, ties fall to the higher max plan index and finally to the
//! higher resource id.

use crate::cache::{ChunkCache, SeriesMetadataCache};
use crate::error::{CoreError, Result};
use crate::model::{SeriesPath, TimeRange, Timestamp, Value};
use crate::read::{ChunkMetadata, ResourceProvider};
use crate::resource::{DeletionRange, FileResource, ResourceId, ResourceSet};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Priority of a resource at a duplicate timestamp. Lexicographic order:
/// version, then max plan index, then resource id (the deterministic
/// final tie-break).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MergePriority {
    version: u64,
    plan_index: i64,
    resource_id: ResourceId,
}

impl MergePriority {
    /// Sequence resources merge as version 0; their mutual order never
    /// matters for correctness because their ranges cannot overlap.
    fn sequence(resource: &FileResource) -> Self {
        Self {
            version: 0,
            plan_index: resource.max_plan_index(),
            resource_id: resource.id(),
        }
    }

    fn unsequence(resource: &FileResource) -> Self {
        Self {
            version: resource.version(),
            plan_index: resource.max_plan_index(),
            resource_id: resource.id(),
        }
    }
}

/// Cursor over one resource's in-range data. Chunk data is loaded lazily
/// through the chunk cache, one chunk at a time, and only for chunks whose
/// range intersects the query predicate.
struct ResourceCursor {
    resource: Arc<FileResource>,
    priority: MergePriority,
    /// The resource's actual version, used for deletion gating.
    writing_version: u64,
    chunks: Vec<ChunkMetadata>,
    next_chunk: usize,
    buffer: VecDeque<(Timestamp, Value)>,
}

impl ResourceCursor {
    fn new(resource: Arc<FileResource>, priority: MergePriority, chunks: Vec<ChunkMetadata>) -> Self {
        let writing_version = resource.version();
        Self {
            resource,
            priority,
            writing_version,
            chunks,
            next_chunk: 0,
            buffer: VecDeque::new(),
        }
    }

    /// Produces the next in-range point, loading further chunks on demand.
    fn next(
        &mut self,
        chunk_cache: &ChunkCache,
        provider: &dyn ResourceProvider,
        predicate: &TimeRange,
    ) -> Result<Option<(Timestamp, Value)>> {
        loop {
            if let Some(point) = self.buffer.pop_front() {
                return Ok(Some(point));
            }
            let chunk = match self.chunks.get(self.next_chunk) {
                Some(chunk) => chunk.clone(),
                None => return Ok(None),
            };
            self.next_chunk += 1;

            let data = chunk_cache.get_or_load(&self.resource, &chunk.locator, provider)?;
            self.buffer.extend(
                data.points
                    .iter()
                    .filter(|(ts, _)| predicate.contains(*ts))
                    .cloned(),
            );
        }
    }
}

/// One pending point in the merge heap.
struct HeapEntry {
    ts: Timestamp,
    priority: MergePriority,
    cursor: usize,
    value: Value,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts && self.priority == other.priority
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: earliest timestamp first, then highest priority.
        other
            .ts
            .cmp(&self.ts)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

/// Lifecycle state of a series reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No point has been requested yet; nothing has been loaded.
    NotStarted,
    /// Cursors are advancing.
    Active,
    /// All cursors are drained (or the reader was closed).
    Exhausted,
    /// A load failed mid-merge; the reader is terminally failed.
    Failed,
}

/// Lazy, ascending-by-timestamp, deduplicated point stream for one series
/// across a resource set.
///
/// The output is strictly ascending with at most one value per timestamp;
/// duplicates are resolved by merge priority. A fresh reader over the same
/// inputs yields an identical sequence. If a chunk load fails mid-merge the
/// reader transitions to [`ReaderState::Failed`] and every subsequent call
/// fails: partial or incorrectly ordered output is never returned.
///
/// Dropping the reader releases its cursors; in-flight cache loads belong
/// to the shared caches and complete for other consumers regardless.
pub struct SeriesReader {
    series: SeriesPath,
    predicate: TimeRange,
    resource_set: ResourceSet,
    deletions: Vec<DeletionRange>,
    metadata_cache: Arc<SeriesMetadataCache>,
    chunk_cache: Arc<ChunkCache>,
    provider: Arc<dyn ResourceProvider>,
    cursors: Vec<ResourceCursor>,
    heap: BinaryHeap<HeapEntry>,
    state: ReaderState,
    failure: Option<String>,
}

impl SeriesReader {
    pub(crate) fn new(
        series: SeriesPath,
        predicate: TimeRange,
        resource_set: ResourceSet,
        deletions: &[DeletionRange],
        metadata_cache: Arc<SeriesMetadataCache>,
        chunk_cache: Arc<ChunkCache>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Result<Self> {
        for resource in resource_set
            .sequence()
            .iter()
            .chain(resource_set.unsequence())
        {
            if !resource.is_closed() {
                return Err(CoreError::ResourceNotClosed {
                    resource: resource.id(),
                });
            }
        }

        // Snapshot the deletions relevant to this series: deletions issued
        // after open never affect this reader.
        let deletions = deletions
            .iter()
            .filter(|deletion| deletion.covers_series(&series))
            .cloned()
            .collect();

        Ok(Self {
            series,
            predicate,
            resource_set,
            deletions,
            metadata_cache,
            chunk_cache,
            provider,
            cursors: Vec::new(),
            heap: BinaryHeap::new(),
            state: ReaderState::NotStarted,
            failure: None,
        })
    }

    /// Returns the reader's lifecycle state.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Produces the next merged point, or `None` once all cursors are
    /// exhausted.
    ///
    /// # Errors
    ///
    /// An I/O failure while loading metadata or chunk data aborts the read:
    /// the error is returned, the reader enters its terminal failed state,
    /// and every later call returns [`CoreError::ReaderFailed`].
    pub fn next_point(&mut self) -> Result<Option<(Timestamp, Value)>> {
        match self.state {
            ReaderState::Failed => {
                return Err(CoreError::ReaderFailed {
                    message: self.failure.clone().unwrap_or_default(),
                })
            }
            ReaderState::Exhausted => return Ok(None),
            ReaderState::NotStarted => {
                if let Err(err) = self.start() {
                    return Err(self.fail(err));
                }
            }
            ReaderState::Active => {}
        }

        loop {
            let winner = match self.heap.pop() {
                Some(entry) => entry,
                None => {
                    self.state = ReaderState::Exhausted;
                    return Ok(None);
                }
            };
            if let Err(err) = self.refill(winner.cursor) {
                return Err(self.fail(err));
            }

            // Consume and drop lower-priority values at the same timestamp.
            while self
                .heap
                .peek()
                .map(|entry| entry.ts == winner.ts)
                .unwrap_or(false)
            {
                // Peek above guarantees a further entry.
                let loser = self.heap.pop().unwrap();
                if let Err(err) = self.refill(loser.cursor) {
                    return Err(self.fail(err));
                }
            }

            let writing_version = self.cursors[winner.cursor].writing_version;
            let suppressed = self
                .deletions
                .iter()
                .any(|deletion| deletion.suppresses(winner.ts, writing_version));
            if suppressed {
                continue;
            }

            return Ok(Some((winner.ts, winner.value)));
        }
    }

    /// Releases cursors and buffered state. A closed reader reports
    /// `Exhausted` (a failed one stays failed) and yields no more points.
    pub fn close(&mut self) {
        self.cursors.clear();
        self.heap.clear();
        if self.state != ReaderState::Failed {
            self.state = ReaderState::Exhausted;
        }
        debug!(series = %self.series, "series reader closed");
    }

    /// Loads metadata for every selected resource, builds one cursor per
    /// resource with in-range chunks, and primes the merge heap.
    fn start(&mut self) -> Result<()> {
        let sequence = self.resource_set.sequence().to_vec();
        let unsequence = self.resource_set.unsequence().to_vec();

        for resource in &sequence {
            let priority = MergePriority::sequence(resource);
            self.add_cursor(resource.clone(), priority)?;
        }
        for resource in &unsequence {
            let priority = MergePriority::unsequence(resource);
            self.add_cursor(resource.clone(), priority)?;
        }

        for index in 0..self.cursors.len() {
            self.refill(index)?;
        }

        self.state = ReaderState::Active;
        debug!(
            series = %self.series,
            cursors = self.cursors.len(),
            "series reader started"
        );
        Ok(())
    }

    fn add_cursor(&mut self, resource: Arc<FileResource>, priority: MergePriority) -> Result<()> {
        let metadata =
            self.metadata_cache
                .get_or_load(&resource, &self.series, self.provider.as_ref())?;
        let chunks = metadata.chunks_in_range(&self.predicate);
        if chunks.is_empty() {
            return Ok(());
        }
        self.cursors
            .push(ResourceCursor::new(resource, priority, chunks));
        Ok(())
    }

    /// Advances the cursor and pushes its next point onto the heap.
    fn refill(&mut self, index: usize) -> Result<()> {
        let next = self.cursors[index].next(
            self.chunk_cache.as_ref(),
            self.provider.as_ref(),
            &self.predicate,
        )?;
        if let Some((ts, value)) = next {
            let priority = self.cursors[index].priority;
            self.heap.push(HeapEntry {
                ts,
                priority,
                cursor: index,
                value,
            });
        }
        Ok(())
    }

    fn fail(&mut self, err: CoreError) -> CoreError {
        self.state = ReaderState::Failed;
        self.failure = Some(err.to_string());
        self.cursors.clear();
        self.heap.clear();
        debug!(series = %self.series, error = %err, "series reader failed");
        err
    }
}
