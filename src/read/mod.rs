//! Merge-read engine: file-access interface and the series reader.
//!
//! The physical file decoder is an external collaborator reached through
//! [`ResourceProvider`]. The core pulls parsed [`SeriesMetadata`] and
//! decoded [`ChunkData`] through the two shared caches and merges the
//! per-resource streams into one time-ordered, deduplicated point stream
//! per series (see [`merge`]).

pub mod merge;

pub use merge::{ReaderState, SeriesReader};

use crate::cache::{ChunkCache, EntryWeight, SeriesMetadataCache};
use crate::error::Result;
use crate::model::{SeriesPath, TimeRange, Timestamp, Value};
use crate::resource::{DeletionRange, FileResource, ResourceSet};
use std::mem;
use std::sync::Arc;

/// Locates one chunk of a series inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkLocator {
    /// Byte offset of the chunk header within the file.
    pub offset: u64,
}

impl ChunkLocator {
    /// Creates a locator for the given file offset.
    pub fn new(offset: u64) -> Self {
        Self { offset }
    }
}

/// Parsed metadata of one chunk: its locator, covered time range, and
/// point count. Within a resource, chunks of a series are ordered by start
/// time and produce points in ascending timestamp order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Locator of the chunk within its resource.
    pub locator: ChunkLocator,
    /// Time range covered by the chunk (half-open).
    pub range: TimeRange,
    /// Number of points in the chunk.
    pub num_points: u32,
}

/// Parsed per-series metadata of one resource: the series' overall time
/// range and its chunk index. A series absent from the resource is
/// represented by an empty chunk list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMetadata {
    /// The series this metadata describes.
    pub series: SeriesPath,
    /// Overall time range of the series within the resource (half-open).
    pub range: TimeRange,
    /// Chunk index, ordered by chunk start time.
    pub chunks: Vec<ChunkMetadata>,
}

impl SeriesMetadata {
    /// Returns the chunks whose range overlaps the predicate.
    pub fn chunks_in_range(&self, predicate: &TimeRange) -> Vec<ChunkMetadata> {
        self.chunks
            .iter()
            .filter(|chunk| chunk.range.overlaps(predicate))
            .cloned()
            .collect()
    }
}

impl EntryWeight for SeriesMetadata {
    fn weight(&self) -> usize {
        mem::size_of::<Self>()
            + self.series.device.len()
            + self.series.measurement.len()
            + self.chunks.len() * mem::size_of::<ChunkMetadata>()
    }
}

/// Decoded point data of one chunk, ascending by timestamp. Absent slots
/// were omitted at write time, so every point carries a present value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Points in ascending timestamp order.
    pub points: Vec<(Timestamp, Value)>,
}

impl ChunkData {
    /// Creates chunk data from points already in ascending order.
    pub fn new(points: Vec<(Timestamp, Value)>) -> Self {
        Self { points }
    }
}

impl EntryWeight for ChunkData {
    fn weight(&self) -> usize {
        let text_bytes: usize = self
            .points
            .iter()
            .map(|(_, value)| match value {
                Value::Text(text) => text.len(),
                _ => 0,
            })
            .sum();
        mem::size_of::<Self>()
            + self.points.len() * mem::size_of::<(Timestamp, Value)>()
            + text_bytes
    }
}

/// File-access collaborator: parses series metadata and decodes chunks
/// from closed resources. Both operations perform I/O and are fallible.
pub trait ResourceProvider: Send + Sync {
    /// Loads the parsed metadata of one series from a closed resource.
    /// Returns metadata with an empty chunk list if the series is absent.
    fn load_series_metadata(
        &self,
        resource: &FileResource,
        series: &SeriesPath,
    ) -> Result<SeriesMetadata>;

    /// Loads and decodes one chunk from a closed resource.
    fn load_chunk(&self, resource: &FileResource, locator: &ChunkLocator) -> Result<ChunkData>;
}

/// Opens a merge reader over one series.
///
/// The deletion list is snapshotted at open: deletions issued afterwards do
/// not affect this reader's output. The reader is lazy; no metadata or
/// chunk is loaded until the first [`SeriesReader::next_point`] call.
///
/// # Errors
///
/// Returns [`CoreError::ResourceNotClosed`](crate::error::CoreError) if the
/// resource set contains a resource that is not closed.
#[allow(clippy::too_many_arguments)]
pub fn open_series_reader(
    series: SeriesPath,
    predicate: TimeRange,
    resource_set: ResourceSet,
    deletions: &[DeletionRange],
    metadata_cache: Arc<SeriesMetadataCache>,
    chunk_cache: Arc<ChunkCache>,
    provider: Arc<dyn ResourceProvider>,
) -> Result<SeriesReader> {
    SeriesReader::new(
        series,
        predicate,
        resource_set,
        deletions,
        metadata_cache,
        chunk_cache,
        provider,
    )
}
