//! Seriescore - Sable Time Series Read/Write Core
//!
//! This crate provides the ingestion-validation and query-merge core for the
//! Sable time series store.
//!
//! # Components
//!
//! - [`validate_and_partition`]: Schema validation with per-measurement
//!   partial-insert partitioning
//! - [`FileResource`] / [`ResourceSet`]: Catalog view of closed data files
//!   and per-query file selection
//! - [`SeriesMetadataCache`] / [`ChunkCache`]: Bounded shared caches with
//!   single-flight loading
//! - [`SeriesReader`]: K-way merge over sequence and unsequence files with
//!   version-based conflict resolution and deletion filtering
//!
//! # Example
//!
//! ```rust,ignore
//! use seriescore::{
//!     open_series_reader, validate_and_partition, ValidatorConfig, WriteBatch,
//! };
//!
//! // Validate a write batch against the schema registry; bad measurements
//! // are set aside, good ones proceed.
//! let outcome = validate_and_partition(&batch, &registry, &ValidatorConfig::default())?;
//! if outcome.accepted().has_valid_measurements() {
//!     engine.write(outcome.accepted())?;
//! }
//!
//! // Read one series back, merged across overlapping files.
//! let mut reader = open_series_reader(
//!     series, predicate, resource_set, &deletions,
//!     metadata_cache, chunk_cache, provider,
//! )?;
//! while let Some((ts, value)) = reader.next_point()? {
//!     // points arrive in ascending timestamp order, one per timestamp
//! }
//! ```

#![deny(missing_docs)]

pub mod cache;
pub mod error;
pub mod ingest;
pub mod model;
pub mod read;
pub mod resource;

pub use cache::{CacheCapacity, CacheConfig, CacheStats, ChunkCache, SeriesMetadataCache};
pub use error::{CoreError, Result};
pub use ingest::{
    validator::{validate_and_partition, ValidationOutcome, ValidatorConfig},
    AcceptedBatch, FailedMeasurementRecord, FailureCause, SchemaLookup, WriteBatch,
};
pub use model::{MeasurementSchema, SeriesPath, TimeRange, Timestamp, Value, ValueType};
pub use read::{
    open_series_reader, ChunkData, ChunkLocator, ChunkMetadata, ReaderState, ResourceProvider,
    SeriesMetadata, SeriesReader,
};
pub use resource::{DeletionRange, FileResource, ResourceId, ResourceSet, ResourceStatus};
