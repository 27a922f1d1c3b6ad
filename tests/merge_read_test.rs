//! Integration tests for the merge reader: ascending deduplicated output,
//! version tie-breaking, deletion gating, and terminal failure.

use proptest::prelude::*;
use seriescore::{
    open_series_reader, CacheCapacity, CacheConfig, ChunkCache, ChunkData, ChunkLocator,
    ChunkMetadata, CoreError, FileResource, ReaderState, ResourceId, ResourceProvider,
    ResourceSet, SeriesMetadata, SeriesMetadataCache, SeriesPath, SeriesReader, TimeRange,
    Timestamp, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory file-access fixture: per-resource series metadata and chunk
/// payloads, with call counters and a failure switch.
#[derive(Default)]
struct MemProvider {
    metadata: HashMap<(ResourceId, SeriesPath), SeriesMetadata>,
    chunks: HashMap<(ResourceId, u64), ChunkData>,
    metadata_loads: AtomicUsize,
    chunk_loads: AtomicUsize,
    fail_chunk_loads: AtomicBool,
}

impl MemProvider {
    /// Registers a series in a resource, one chunk per inner vector. Points
    /// must be ascending within each chunk and across chunks.
    fn add_series(
        &mut self,
        resource_id: ResourceId,
        series: &SeriesPath,
        chunks: Vec<Vec<(Timestamp, Value)>>,
    ) {
        let mut chunk_metas = Vec::new();
        for (idx, points) in chunks.into_iter().enumerate() {
            let offset = (idx as u64) * 4096;
            let first = points.first().map(|(ts, _)| *ts).unwrap_or(0);
            let last = points.last().map(|(ts, _)| *ts).unwrap_or(0);
            chunk_metas.push(ChunkMetadata {
                locator: ChunkLocator::new(offset),
                range: TimeRange::new(first, last + 1),
                num_points: points.len() as u32,
            });
            self.chunks
                .insert((resource_id, offset), ChunkData::new(points));
        }
        let first = chunk_metas.first().map(|c| c.range.start).unwrap_or(0);
        let last = chunk_metas.last().map(|c| c.range.end).unwrap_or(0);
        self.metadata.insert(
            (resource_id, series.clone()),
            SeriesMetadata {
                series: series.clone(),
                range: TimeRange::new(first, last),
                chunks: chunk_metas,
            },
        );
    }
}

impl ResourceProvider for MemProvider {
    fn load_series_metadata(
        &self,
        resource: &FileResource,
        series: &SeriesPath,
    ) -> seriescore::Result<SeriesMetadata> {
        self.metadata_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .metadata
            .get(&(resource.id(), series.clone()))
            .cloned()
            .unwrap_or_else(|| SeriesMetadata {
                series: series.clone(),
                range: TimeRange::new(0, 0),
                chunks: Vec::new(),
            }))
    }

    fn load_chunk(
        &self,
        resource: &FileResource,
        locator: &ChunkLocator,
    ) -> seriescore::Result<ChunkData> {
        if self.fail_chunk_loads.load(Ordering::SeqCst) {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected chunk read failure",
            )));
        }
        self.chunk_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .chunks
            .get(&(resource.id(), locator.offset))
            .cloned()
            .expect("chunk registered in fixture"))
    }
}

fn closed_resource(
    id: ResourceId,
    version: u64,
    device: &str,
    start: Timestamp,
    end: Timestamp,
    plan_index: i64,
) -> Arc<FileResource> {
    let mut resource = FileResource::new(id);
    resource.set_version(version);
    resource.update_start_time(device, start);
    resource.update_end_time(device, end);
    resource.update_plan_index(plan_index);
    resource.close().unwrap();
    Arc::new(resource)
}

struct Fixture {
    provider: Arc<MemProvider>,
    metadata_cache: Arc<SeriesMetadataCache>,
    chunk_cache: Arc<ChunkCache>,
}

impl Fixture {
    fn new(provider: MemProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            metadata_cache: Arc::new(SeriesMetadataCache::new(CacheConfig::default())),
            chunk_cache: Arc::new(ChunkCache::new(
                CacheConfig::default().with_capacity(CacheCapacity::Bytes(1 << 20)),
            )),
        }
    }

    fn open(
        &self,
        series: &SeriesPath,
        predicate: TimeRange,
        set: &ResourceSet,
        deletions: &[seriescore::DeletionRange],
    ) -> SeriesReader {
        open_series_reader(
            series.clone(),
            predicate,
            set.clone(),
            deletions,
            self.metadata_cache.clone(),
            self.chunk_cache.clone(),
            self.provider.clone(),
        )
        .unwrap()
    }
}

fn drain(reader: &mut SeriesReader) -> Vec<(Timestamp, Value)> {
    let mut out = Vec::new();
    while let Some(point) = reader.next_point().unwrap() {
        out.push(point);
    }
    out
}

fn int_points(entries: &[(Timestamp, i64)]) -> Vec<(Timestamp, Value)> {
    entries
        .iter()
        .map(|(ts, v)| (*ts, Value::Int64(*v)))
        .collect()
}

/// Tests a plain read over one sequence resource with a narrowing predicate:
/// only in-range points come back, in ascending order.
#[test]
fn test_single_resource_predicate_filtering() {
    let series = SeriesPath::new("d1", "s1");
    let mut provider = MemProvider::default();
    provider.add_series(
        1,
        &series,
        vec![
            int_points(&[(0, 1), (10, 2), (20, 3)]),
            int_points(&[(30, 4), (40, 5), (50, 6)]),
        ],
    );
    let fixture = Fixture::new(provider);

    let seq = vec![closed_resource(1, 1, "d1", 0, 50, 1)];
    let set = ResourceSet::assemble(&seq, &[], "d1", &TimeRange::new(10, 45)).unwrap();

    let mut reader = fixture.open(&series, TimeRange::new(10, 45), &set, &[]);
    assert_eq!(reader.state(), ReaderState::NotStarted);

    let points = drain(&mut reader);
    assert_eq!(points, int_points(&[(10, 2), (20, 3), (30, 4), (40, 5)]));
    assert_eq!(reader.state(), ReaderState::Exhausted);

    // Exhausted readers keep answering None.
    assert_eq!(reader.next_point().unwrap(), None);
}

/// Tests the duplicate-timestamp contract: the unsequence resource carries a
/// higher version, so its value wins at the shared timestamp and the
/// sequence value is dropped, not emitted later.
#[test]
fn test_unsequence_overrides_sequence_at_duplicate() {
    let series = SeriesPath::new("d1", "s1");
    let mut provider = MemProvider::default();
    provider.add_series(1, &series, vec![int_points(&[(0, 1), (50, 10), (90, 3)])]);
    provider.add_series(2, &series, vec![int_points(&[(50, 99)])]);
    let fixture = Fixture::new(provider);

    let seq = vec![closed_resource(1, 1, "d1", 0, 99, 1)];
    let unseq = vec![closed_resource(2, 2, "d1", 40, 60, 2)];
    let set = ResourceSet::assemble(&seq, &unseq, "d1", &TimeRange::new(0, 100)).unwrap();

    let mut reader = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    let points = drain(&mut reader);
    assert_eq!(points, int_points(&[(0, 1), (50, 99), (90, 3)]));
}

/// Tests the tie-break ladder among unsequence resources at one timestamp:
/// version first, then max plan index, then resource id.
#[test]
fn test_duplicate_tiebreak_ladder() {
    let series = SeriesPath::new("d1", "s1");
    let mut provider = MemProvider::default();
    provider.add_series(1, &series, vec![int_points(&[(10, 1)])]);
    provider.add_series(2, &series, vec![int_points(&[(10, 2)])]);
    provider.add_series(3, &series, vec![int_points(&[(10, 3)])]);
    provider.add_series(4, &series, vec![int_points(&[(10, 4)])]);
    let fixture = Fixture::new(provider);

    // Resource 2 has the highest version; 3 and 4 tie with it on nothing.
    // Among 3 and 4 (same version), 4 has the higher plan index.
    let unseq = vec![
        closed_resource(1, 1, "d1", 0, 20, 5),
        closed_resource(2, 3, "d1", 0, 20, 1),
        closed_resource(3, 2, "d1", 0, 20, 2),
        closed_resource(4, 2, "d1", 0, 20, 7),
    ];
    let set = ResourceSet::assemble(&[], &unseq, "d1", &TimeRange::new(0, 100)).unwrap();

    let mut reader = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    let points = drain(&mut reader);
    assert_eq!(points, int_points(&[(10, 2)]));
}

/// Tests deletion gating: a deletion suppresses only data written at or
/// below its version, and only inside its half-open range.
#[test]
fn test_deletion_version_and_range_gating() {
    let series = SeriesPath::new("d1", "s1");
    let mut provider = MemProvider::default();
    provider.add_series(1, &series, vec![int_points(&[(10, 1), (15, 2), (25, 3)])]);
    provider.add_series(2, &series, vec![int_points(&[(12, 50)])]);
    let fixture = Fixture::new(provider);

    let seq = vec![closed_resource(1, 1, "d1", 0, 30, 1)];
    let unseq = vec![closed_resource(2, 5, "d1", 10, 14, 2)];
    let set = ResourceSet::assemble(&seq, &unseq, "d1", &TimeRange::new(0, 100)).unwrap();

    // Deletion at version 2 over [10, 20): kills the version-1 points at
    // 10 and 15 but not the version-5 point at 12, nor the point at 25.
    let deletions = vec![seriescore::DeletionRange::new(
        &series,
        TimeRange::new(10, 20),
        2,
    )];

    let mut reader = fixture.open(&series, TimeRange::new(0, 100), &set, &deletions);
    let points = drain(&mut reader);
    assert_eq!(points, int_points(&[(12, 50), (25, 3)]));
}

/// Tests that a deletion scoped to another measurement never touches this
/// series.
#[test]
fn test_deletion_scoped_to_other_series_ignored() {
    let series = SeriesPath::new("d1", "s1");
    let other = SeriesPath::new("d1", "s2");
    let mut provider = MemProvider::default();
    provider.add_series(1, &series, vec![int_points(&[(10, 1)])]);
    let fixture = Fixture::new(provider);

    let seq = vec![closed_resource(1, 1, "d1", 0, 30, 1)];
    let set = ResourceSet::assemble(&seq, &[], "d1", &TimeRange::new(0, 100)).unwrap();
    let deletions = vec![seriescore::DeletionRange::new(
        &other,
        TimeRange::new(0, 100),
        9,
    )];

    let mut reader = fixture.open(&series, TimeRange::new(0, 100), &set, &deletions);
    assert_eq!(drain(&mut reader), int_points(&[(10, 1)]));
}

/// Tests read idempotence and cache sharing: a second reader over the same
/// inputs yields the identical sequence without touching the provider again.
#[test]
fn test_reread_identical_and_served_from_cache() {
    let series = SeriesPath::new("d1", "s1");
    let mut provider = MemProvider::default();
    provider.add_series(1, &series, vec![int_points(&[(0, 1), (10, 2)])]);
    provider.add_series(2, &series, vec![int_points(&[(5, 7), (10, 9)])]);
    let fixture = Fixture::new(provider);

    let seq = vec![closed_resource(1, 1, "d1", 0, 20, 1)];
    let unseq = vec![closed_resource(2, 2, "d1", 0, 20, 2)];
    let set = ResourceSet::assemble(&seq, &unseq, "d1", &TimeRange::new(0, 100)).unwrap();

    let mut first = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    let first_points = drain(&mut first);
    assert_eq!(first_points, int_points(&[(0, 1), (5, 7), (10, 9)]));

    let metadata_loads = fixture.provider.metadata_loads.load(Ordering::SeqCst);
    let chunk_loads = fixture.provider.chunk_loads.load(Ordering::SeqCst);

    let mut second = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    assert_eq!(drain(&mut second), first_points);

    assert_eq!(
        fixture.provider.metadata_loads.load(Ordering::SeqCst),
        metadata_loads
    );
    assert_eq!(
        fixture.provider.chunk_loads.load(Ordering::SeqCst),
        chunk_loads
    );
    assert!(fixture.metadata_cache.stats().hits() >= 2);
    assert!(fixture.chunk_cache.stats().hits() >= 2);
}

/// Tests the terminal failure contract: a chunk-load failure surfaces the
/// error once, and every later call reports the failed state instead of
/// returning partial output.
#[test]
fn test_load_failure_is_terminal() {
    let series = SeriesPath::new("d1", "s1");
    let mut provider = MemProvider::default();
    provider.add_series(1, &series, vec![int_points(&[(0, 1), (10, 2)])]);
    provider.fail_chunk_loads.store(true, Ordering::SeqCst);
    let fixture = Fixture::new(provider);

    let seq = vec![closed_resource(1, 1, "d1", 0, 20, 1)];
    let set = ResourceSet::assemble(&seq, &[], "d1", &TimeRange::new(0, 100)).unwrap();

    let mut reader = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    let err = reader.next_point().unwrap_err();
    assert!(matches!(err, CoreError::Io(_)), "got: {:?}", err);
    assert_eq!(reader.state(), ReaderState::Failed);

    // Clearing the fault does not revive the reader.
    fixture
        .provider
        .fail_chunk_loads
        .store(false, Ordering::SeqCst);
    let err = reader.next_point().unwrap_err();
    assert!(matches!(err, CoreError::ReaderFailed { .. }), "got: {:?}", err);

    // A fresh reader over the same inputs works.
    let mut fresh = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    assert_eq!(drain(&mut fresh), int_points(&[(0, 1), (10, 2)]));
}

/// Tests an empty resource set and explicit close.
#[test]
fn test_empty_set_and_close() {
    let series = SeriesPath::new("d1", "s1");
    let fixture = Fixture::new(MemProvider::default());

    let set = ResourceSet::default();
    let mut reader = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    assert_eq!(reader.next_point().unwrap(), None);
    assert_eq!(reader.state(), ReaderState::Exhausted);

    let mut closed_early = fixture.open(&series, TimeRange::new(0, 100), &set, &[]);
    closed_early.close();
    assert_eq!(closed_early.state(), ReaderState::Exhausted);
    assert_eq!(closed_early.next_point().unwrap(), None);
}

proptest! {
    /// Any mix of overlapping unsequence resources merges into a strictly
    /// ascending stream with at most one value per timestamp, all inside
    /// the predicate.
    #[test]
    fn prop_merge_output_strictly_ascending(
        resources in prop::collection::vec(
            (1u64..10, prop::collection::btree_set(0i64..200, 1..30)),
            1..5,
        ),
        lo in 0i64..100,
        width in 1i64..150,
    ) {
        let series = SeriesPath::new("d1", "s1");
        let predicate = TimeRange::new(lo, lo + width);

        let mut provider = MemProvider::default();
        let mut unseq = Vec::new();
        for (idx, (version, timestamps)) in resources.iter().enumerate() {
            let id = (idx + 1) as ResourceId;
            let points: Vec<(Timestamp, Value)> = timestamps
                .iter()
                .map(|ts| (*ts, Value::Int64(id as i64)))
                .collect();
            let first = *timestamps.iter().next().unwrap();
            let last = *timestamps.iter().last().unwrap();
            provider.add_series(id, &series, vec![points]);
            unseq.push(closed_resource(id, *version, "d1", first, last, id as i64));
        }
        let fixture = Fixture::new(provider);
        let set = ResourceSet::assemble(&[], &unseq, "d1", &predicate).unwrap();

        let mut reader = fixture.open(&series, predicate, &set, &[]);
        let points = drain(&mut reader);
        for pair in points.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0);
        }
        for (ts, _) in &points {
            prop_assert!(predicate.contains(*ts));
        }
    }
}
