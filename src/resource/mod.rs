//! File-backed resource model and per-query resource set assembly.
//!
//! A [`FileResource`] is the catalog entry for one written artifact: its
//! per-device time ranges, lifecycle status, recency version, and plan-index
//! bounds. Resources are mutated by a single writer while `Writing` and are
//! immutable once `Closed`; only closed resources are eligible for reads.
//!
//! A [`ResourceSet`] is the per-query selection of resources, split into the
//! ordered sequence list (non-overlapping time ranges per device) and the
//! unordered unsequence list (arbitrary ranges, explicit versions).

use crate::error::{CoreError, Result};
use crate::model::{SeriesPath, TimeRange, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;

/// Identifier of one file-backed resource.
pub type ResourceId = u64;

/// Lifecycle status of a resource.
///
/// Transitions: `Writing -> Closed -> Deleted`. No other transition is
/// valid; in particular a resource never reopens for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// The resource is being written; its chunk data must not be read.
    Writing,
    /// The resource is sealed and immutable.
    Closed,
    /// The resource has been removed (merged away or dropped).
    Deleted,
}

impl ResourceStatus {
    fn name(self) -> &'static str {
        match self {
            ResourceStatus::Writing => "WRITING",
            ResourceStatus::Closed => "CLOSED",
            ResourceStatus::Deleted => "DELETED",
        }
    }
}

/// Catalog metadata for one written file.
#[derive(Debug, Clone)]
pub struct FileResource {
    id: ResourceId,
    status: ResourceStatus,
    start_times: HashMap<String, Timestamp>,
    end_times: HashMap<String, Timestamp>,
    version: u64,
    min_plan_index: i64,
    max_plan_index: i64,
}

impl FileResource {
    /// Creates a new resource in the `Writing` state with no device ranges.
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            status: ResourceStatus::Writing,
            start_times: HashMap::new(),
            end_times: HashMap::new(),
            version: 0,
            min_plan_index: i64::MAX,
            max_plan_index: i64::MIN,
        }
    }

    /// Returns the resource identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the lifecycle status.
    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    /// Returns true if the resource is closed.
    pub fn is_closed(&self) -> bool {
        self.status == ResourceStatus::Closed
    }

    /// Returns the recency version of this resource.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sets the recency version. Only valid before the resource closes.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Returns the minimum plan index written into this resource.
    pub fn min_plan_index(&self) -> i64 {
        self.min_plan_index
    }

    /// Returns the maximum plan index written into this resource.
    pub fn max_plan_index(&self) -> i64 {
        self.max_plan_index
    }

    /// Widens the plan-index bounds to include `plan_index`.
    pub fn update_plan_index(&mut self, plan_index: i64) {
        self.min_plan_index = self.min_plan_index.min(plan_index);
        self.max_plan_index = self.max_plan_index.max(plan_index);
    }

    /// Lowers the recorded start time for a device if `ts` is earlier.
    pub fn update_start_time(&mut self, device: &str, ts: Timestamp) {
        self.start_times
            .entry(device.to_string())
            .and_modify(|start| *start = (*start).min(ts))
            .or_insert(ts);
    }

    /// Raises the recorded end time for a device if `ts` is later.
    pub fn update_end_time(&mut self, device: &str, ts: Timestamp) {
        self.end_times
            .entry(device.to_string())
            .and_modify(|end| *end = (*end).max(ts))
            .or_insert(ts);
    }

    /// Returns the covered time range for a device as a half-open range,
    /// or `None` if the device never wrote into this resource.
    pub fn device_range(&self, device: &str) -> Option<TimeRange> {
        let start = *self.start_times.get(device)?;
        let end = *self.end_times.get(device)?;
        Some(TimeRange::new(start, end + 1))
    }

    /// Returns true if this resource may contain data for the device inside
    /// the predicate range. Cheap catalog check only; no file access.
    pub fn may_contain(&self, device: &str, predicate: &TimeRange) -> bool {
        match self.device_range(device) {
            Some(range) => range.overlaps(predicate),
            None => false,
        }
    }

    /// Seals the resource. Valid only from the `Writing` state.
    pub fn close(&mut self) -> Result<()> {
        self.transition(ResourceStatus::Writing, ResourceStatus::Closed)
    }

    /// Marks the resource deleted. Valid only from the `Closed` state.
    pub fn mark_deleted(&mut self) -> Result<()> {
        self.transition(ResourceStatus::Closed, ResourceStatus::Deleted)
    }

    fn transition(&mut self, from: ResourceStatus, to: ResourceStatus) -> Result<()> {
        if self.status != from {
            return Err(CoreError::InvalidStatusTransition {
                resource: self.id,
                from: self.status.name(),
                to: to.name(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// A tombstone suppressing previously written points of one series within a
/// time range, as of some version. Deletions only affect data whose writing
/// version is at or below the deletion's issuing version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRange {
    /// Device scope.
    pub device: String,
    /// Measurement scope.
    pub measurement: String,
    /// Suppressed time range (half-open).
    pub range: TimeRange,
    /// Version at which the deletion was issued.
    pub version: u64,
}

impl DeletionRange {
    /// Creates a new deletion range.
    pub fn new(series: &SeriesPath, range: TimeRange, version: u64) -> Self {
        Self {
            device: series.device.clone(),
            measurement: series.measurement.clone(),
            range,
            version,
        }
    }

    /// Returns true if this deletion covers the given series.
    pub fn covers_series(&self, series: &SeriesPath) -> bool {
        self.device == series.device && self.measurement == series.measurement
    }

    /// Returns true if this deletion suppresses a point of the series at
    /// `ts` that was written under `writing_version`.
    pub fn suppresses(&self, ts: Timestamp, writing_version: u64) -> bool {
        self.range.contains(ts) && self.version >= writing_version
    }
}

/// The collection of resources relevant to one query.
///
/// `sequence` is ordered by time range, and no two sequence resources may
/// overlap in time for the queried device; `unsequence` carries arbitrary
/// ranges with explicit versions. Built fresh per query, read-only after.
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    sequence: Vec<Arc<FileResource>>,
    unsequence: Vec<Arc<FileResource>>,
}

impl ResourceSet {
    /// Selects the resources relevant to a query over `device` within
    /// `predicate`.
    ///
    /// Resources that are not closed, or whose device range cannot overlap
    /// the predicate, are excluded before any cache or file access. The
    /// sequence-overlap invariant is verified on the selected sequence
    /// resources.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SequenceOverlap`] if two selected sequence
    /// resources overlap in time for the device. This is an
    /// internal-consistency failure of the resource catalog.
    pub fn assemble(
        sequence_candidates: &[Arc<FileResource>],
        unsequence_candidates: &[Arc<FileResource>],
        device: &str,
        predicate: &TimeRange,
    ) -> Result<Self> {
        let sequence: Vec<Arc<FileResource>> = sequence_candidates
            .iter()
            .filter(|resource| resource.is_closed() && resource.may_contain(device, predicate))
            .cloned()
            .collect();

        // Compare neighbors in start-time order, not stored order: a
        // catalog delivered out of order must not hide an overlap between
        // non-adjacent entries.
        let mut ranges: Vec<(TimeRange, ResourceId)> = sequence
            .iter()
            .filter_map(|resource| {
                resource
                    .device_range(device)
                    .map(|range| (range, resource.id()))
            })
            .collect();
        ranges.sort_by_key(|(range, _)| range.start);
        for pair in ranges.windows(2) {
            if pair[0].0.overlaps(&pair[1].0) {
                return Err(CoreError::SequenceOverlap {
                    device: device.to_string(),
                    first: pair[0].1,
                    second: pair[1].1,
                });
            }
        }

        let unsequence: Vec<Arc<FileResource>> = unsequence_candidates
            .iter()
            .filter(|resource| resource.is_closed() && resource.may_contain(device, predicate))
            .cloned()
            .collect();

        Ok(Self {
            sequence,
            unsequence,
        })
    }

    /// Returns the selected sequence resources in stored time order.
    pub fn sequence(&self) -> &[Arc<FileResource>] {
        &self.sequence
    }

    /// Returns the selected unsequence resources.
    pub fn unsequence(&self) -> &[Arc<FileResource>] {
        &self.unsequence
    }

    /// Returns the total number of selected resources.
    pub fn len(&self) -> usize {
        self.sequence.len() + self.unsequence.len()
    }

    /// Returns true if no resource was selected.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty() && self.unsequence.is_empty()
    }
}
