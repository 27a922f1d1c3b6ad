//! Error and Result types for seriescore operations.

use crate::model::ValueType;
use crate::resource::ResourceId;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for seriescore operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The error type for ingestion and merge-read operations.
///
/// Per-measurement validation failures are *not* errors: they are collected
/// as [`FailedMeasurementRecord`](crate::ingest::FailedMeasurementRecord)
/// values so that the rest of the batch can proceed. This enum covers the
/// request-fatal, infrastructure, and invariant-violation classes only.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The write batch shape is inconsistent (mismatched array lengths,
    /// missing column slots, or unordered row timestamps).
    #[error("Malformed write batch: {reason}")]
    MalformedBatch {
        /// Description of the shape violation.
        reason: String,
    },

    /// A measurement name in the batch is absent or empty. This is a caller
    /// contract violation and is fatal regardless of partial-insert mode.
    #[error("Invalid measurement name at index {index}")]
    InvalidMeasurementName {
        /// Index of the offending measurement.
        index: usize,
    },

    /// No schema is registered for the series and partial insert is disabled.
    #[error("Path not found: {path}")]
    SchemaNotFound {
        /// Full series path (device.measurement).
        path: String,
    },

    /// Declared value type cannot be coerced to the schema type and partial
    /// insert is disabled.
    #[error(
        "Data type mismatch for {path}: declared {declared}, expected {expected} \
         (min time {min_time}, first value {first_value})"
    )]
    TypeMismatch {
        /// Full series path (device.measurement).
        path: String,
        /// Type declared by the client.
        declared: ValueType,
        /// Type registered in the schema.
        expected: ValueType,
        /// Minimum timestamp of the batch, for diagnostics.
        min_time: i64,
        /// First offending value, rendered for diagnostics.
        first_value: String,
    },

    /// Two sequence resources overlap in time for the same device. This
    /// indicates a corrupted resource catalog, not a data error.
    #[error(
        "Overlapping sequence resources for device {device}: resource {first} and resource {second}"
    )]
    SequenceOverlap {
        /// Device whose ranges overlap.
        device: String,
        /// First offending resource.
        first: ResourceId,
        /// Second offending resource.
        second: ResourceId,
    },

    /// A resource that is not in the `Closed` state was handed to the merge
    /// reader. Only closed resources have immutable, readable chunk data.
    #[error("Resource {resource} is not closed")]
    ResourceNotClosed {
        /// The offending resource.
        resource: ResourceId,
    },

    /// An invalid lifecycle transition was requested on a resource.
    #[error("Invalid status transition for resource {resource}: {from} -> {to}")]
    InvalidStatusTransition {
        /// The resource whose transition was rejected.
        resource: ResourceId,
        /// Current status.
        from: &'static str,
        /// Requested status.
        to: &'static str,
    },

    /// A concurrent caller's in-flight cache load failed. The underlying
    /// error went to the caller that ran the loader; waiters observe this
    /// variant. The failed entry is not cached, so a later call retries.
    #[error("Shared cache load failed: {message}")]
    SharedLoadFailed {
        /// Message of the loading caller's error.
        message: String,
    },

    /// The series reader entered its terminal failed state on an earlier
    /// call; no partial resumption is possible.
    #[error("Series reader failed: {message}")]
    ReaderFailed {
        /// Message of the failure that terminated the reader.
        message: String,
    },

    /// Underlying I/O error while loading file metadata or chunk data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
