//! Ingestion types: write batches, accepted subsets, and per-measurement
//! failure records.
//!
//! A [`WriteBatch`] carries parallel arrays of measurement names, declared
//! types, and value columns for one device. The validator partitions it into
//! an [`AcceptedBatch`] plus a list of [`FailedMeasurementRecord`]s; with
//! partial insert enabled, one bad measurement never aborts an otherwise
//! valid batch.

pub mod validator;

pub use validator::{validate_and_partition, ValidationOutcome, ValidatorConfig};

use crate::error::{CoreError, Result};
use crate::model::{MeasurementSchema, Timestamp, Value, ValueType};
use std::fmt;

/// Read-only lookup into the external measurement-schema registry.
///
/// The core never mutates the registry; it is owned by an external
/// collaborator and schemas are immutable once registered.
pub trait SchemaLookup {
    /// Returns the registered schema for `measurement` under `device`, or
    /// `None` if the series is unknown.
    fn measurement_schema(&self, device: &str, measurement: &str) -> Option<MeasurementSchema>;
}

/// One incoming write: a device, one or more row timestamps, and one value
/// column per measurement.
///
/// Invariants (checked by the validator, violations are request-fatal):
/// - `measurements`, `declared_types`, and `columns` have the same length;
/// - every column has one slot per row timestamp;
/// - row timestamps are strictly ascending.
///
/// A `None` slot in a column is a first-class "absent" marker: accepted,
/// forwarded downstream to be omitted from the written chunk, and never
/// defaulted to a sentinel.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    device: String,
    rows: Vec<Timestamp>,
    measurements: Vec<Option<String>>,
    declared_types: Vec<ValueType>,
    columns: Vec<Vec<Option<Value>>>,
}

impl WriteBatch {
    /// Creates an empty batch for the given device and row timestamps.
    pub fn new(device: impl Into<String>, rows: Vec<Timestamp>) -> Self {
        Self {
            device: device.into(),
            rows,
            measurements: Vec::new(),
            declared_types: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Creates a single-record batch (one timestamp).
    pub fn single_record(device: impl Into<String>, ts: Timestamp) -> Self {
        Self::new(device, vec![ts])
    }

    /// Appends a measurement column.
    pub fn with_column(
        mut self,
        measurement: impl Into<String>,
        declared_type: ValueType,
        values: Vec<Option<Value>>,
    ) -> Self {
        self.measurements.push(Some(measurement.into()));
        self.declared_types.push(declared_type);
        self.columns.push(values);
        self
    }

    /// Appends a column with an absent measurement name. Used by callers
    /// that splice batches; the validator rejects it as request-fatal.
    pub fn with_unnamed_column(
        mut self,
        declared_type: ValueType,
        values: Vec<Option<Value>>,
    ) -> Self {
        self.measurements.push(None);
        self.declared_types.push(declared_type);
        self.columns.push(values);
        self
    }

    /// Returns the device identifier.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the row timestamps.
    pub fn rows(&self) -> &[Timestamp] {
        &self.rows
    }

    /// Returns the measurement names, `None` marking an absent name.
    pub fn measurements(&self) -> &[Option<String>] {
        &self.measurements
    }

    /// Returns the declared types, parallel to `measurements`.
    pub fn declared_types(&self) -> &[ValueType] {
        &self.declared_types
    }

    /// Returns the value columns, parallel to `measurements`.
    pub fn columns(&self) -> &[Vec<Option<Value>>] {
        &self.columns
    }

    /// Returns the minimum row timestamp, used in failure diagnostics.
    pub fn min_time(&self) -> Timestamp {
        self.rows.iter().copied().min().unwrap_or(Timestamp::MIN)
    }

    /// Returns the first present value of a column, for diagnostics.
    pub fn first_value_of(&self, index: usize) -> Option<&Value> {
        self.columns
            .get(index)
            .and_then(|column| column.iter().flatten().next())
    }

    /// Verifies the batch shape invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedBatch`] describing the first violation.
    pub fn check_shape(&self) -> Result<()> {
        if self.rows.is_empty() {
            return Err(malformed("batch has no row timestamps"));
        }
        if self.measurements.len() != self.declared_types.len()
            || self.measurements.len() != self.columns.len()
        {
            return Err(malformed(format!(
                "parallel array lengths differ: {} measurements, {} types, {} columns",
                self.measurements.len(),
                self.declared_types.len(),
                self.columns.len()
            )));
        }
        for (index, column) in self.columns.iter().enumerate() {
            if column.len() != self.rows.len() {
                return Err(malformed(format!(
                    "column {} has {} slots for {} rows",
                    index,
                    column.len(),
                    self.rows.len()
                )));
            }
        }
        for pair in self.rows.windows(2) {
            if pair[0] >= pair[1] {
                return Err(malformed(format!(
                    "row timestamps not strictly ascending: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }
}

fn malformed(reason: impl Into<String>) -> CoreError {
    CoreError::MalformedBatch {
        reason: reason.into(),
    }
}

/// Cause of a per-measurement validation failure. Recoverable when partial
/// insert is enabled; otherwise the same cause aborts the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// No schema is registered for the series.
    SchemaNotFound {
        /// Full series path (device.measurement).
        path: String,
    },
    /// Declared type cannot be coerced to the schema type.
    TypeMismatch {
        /// Type declared by the client.
        declared: ValueType,
        /// Type registered in the schema.
        expected: ValueType,
        /// Minimum timestamp of the batch.
        min_time: Timestamp,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::SchemaNotFound { path } => write!(f, "Path not found: {}", path),
            FailureCause::TypeMismatch {
                declared,
                expected,
                min_time,
            } => write!(
                f,
                "Data type mismatch: declared {}, expected {} (min time {})",
                declared, expected, min_time
            ),
        }
    }
}

/// Failure record for one measurement index of a batch. Never silently
/// dropped; always surfaced to the caller alongside the accepted subset.
#[derive(Debug, Clone)]
pub struct FailedMeasurementRecord {
    /// Index of the measurement in the original batch.
    pub index: usize,
    /// Measurement name.
    pub measurement: String,
    /// Type declared by the client.
    pub declared_type: ValueType,
    /// First offending value, if any value was present.
    pub value: Option<Value>,
    /// Cause of the failure.
    pub cause: FailureCause,
}

/// One accepted measurement column with its resolved type and (possibly
/// coerced) values.
#[derive(Debug, Clone)]
pub struct AcceptedColumn {
    /// Index of the measurement in the original batch.
    pub index: usize,
    /// Measurement name.
    pub measurement: String,
    /// Type the values were resolved to (the schema type).
    pub resolved_type: ValueType,
    /// Values per row; `None` slots stay absent.
    pub values: Vec<Option<Value>>,
}

/// The subset of a batch that passed validation, ready to be written by the
/// external write path.
#[derive(Debug, Clone)]
pub struct AcceptedBatch {
    device: String,
    rows: Vec<Timestamp>,
    columns: Vec<AcceptedColumn>,
}

impl AcceptedBatch {
    pub(crate) fn new(device: String, rows: Vec<Timestamp>, columns: Vec<AcceptedColumn>) -> Self {
        Self {
            device,
            rows,
            columns,
        }
    }

    /// Returns the device identifier.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the row timestamps.
    pub fn rows(&self) -> &[Timestamp] {
        &self.rows
    }

    /// Returns the accepted columns.
    pub fn columns(&self) -> &[AcceptedColumn] {
        &self.columns
    }

    /// Returns the number of accepted measurements.
    pub fn accepted_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if at least one measurement was accepted.
    pub fn has_valid_measurements(&self) -> bool {
        !self.columns.is_empty()
    }
}
