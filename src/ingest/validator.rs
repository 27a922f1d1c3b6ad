//! Per-measurement schema and type validation with partial-insert isolation.
//!
//! Each measurement index of a [`WriteBatch`] is checked against the schema
//! registry. With partial insert enabled, schema-not-found and uncoercible
//! type mismatches are isolated into [`FailedMeasurementRecord`]s and the
//! rest of the batch proceeds; with it disabled, the first such failure
//! aborts the whole batch. Malformed batch shape and absent measurement
//! names are request-fatal in either mode.

use crate::error::{CoreError, Result};
use crate::ingest::{
    AcceptedBatch, AcceptedColumn, FailedMeasurementRecord, FailureCause, SchemaLookup, WriteBatch,
};
use crate::model::{Value, ValueType};
use tracing::debug;

/// Configuration for the ingestion validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Whether failing measurements are isolated instead of aborting the
    /// batch. Default: true.
    pub partial_insert_enabled: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            partial_insert_enabled: true,
        }
    }
}

impl ValidatorConfig {
    /// Creates a configuration with custom partial-insert mode.
    pub fn with_partial_insert(mut self, enabled: bool) -> Self {
        self.partial_insert_enabled = enabled;
        self
    }
}

/// Result of validating one batch: the accepted subset plus the failure
/// records for every rejected measurement index.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// The subset of the batch that passed validation.
    pub accepted: AcceptedBatch,
    /// Per-index failure records, in batch index order.
    pub failed: Vec<FailedMeasurementRecord>,
}

impl ValidationOutcome {
    /// Returns the number of failed measurements.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Returns true if any measurement failed validation.
    pub fn has_failed_measurements(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Returns the failed measurement names, in batch index order.
    pub fn failed_measurements(&self) -> Vec<&str> {
        self.failed
            .iter()
            .map(|record| record.measurement.as_str())
            .collect()
    }

    /// Returns one human-readable message per failed measurement.
    pub fn failed_messages(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|record| record.cause.to_string())
            .collect()
    }
}

/// Validates a write batch against the schema registry and partitions it
/// into accepted columns and failure records.
///
/// # Errors
///
/// - [`CoreError::MalformedBatch`] for shape violations (always fatal).
/// - [`CoreError::InvalidMeasurementName`] for an absent/empty measurement
///   name (always fatal).
/// - [`CoreError::SchemaNotFound`] / [`CoreError::TypeMismatch`] when
///   partial insert is disabled and a measurement fails.
pub fn validate_and_partition(
    batch: &WriteBatch,
    schemas: &dyn SchemaLookup,
    config: &ValidatorConfig,
) -> Result<ValidationOutcome> {
    batch.check_shape()?;

    let mut accepted = Vec::new();
    let mut failed = Vec::new();

    for index in 0..batch.measurements().len() {
        let measurement = match &batch.measurements()[index] {
            Some(name) if !name.is_empty() => name,
            _ => return Err(CoreError::InvalidMeasurementName { index }),
        };
        let declared = batch.declared_types()[index];
        let column = &batch.columns()[index];

        let schema = match schemas.measurement_schema(batch.device(), measurement) {
            Some(schema) => schema,
            None => {
                let path = format!("{}.{}", batch.device(), measurement);
                if !config.partial_insert_enabled {
                    return Err(CoreError::SchemaNotFound { path });
                }
                failed.push(FailedMeasurementRecord {
                    index,
                    measurement: measurement.clone(),
                    declared_type: declared,
                    value: batch.first_value_of(index).cloned(),
                    cause: FailureCause::SchemaNotFound { path },
                });
                continue;
            }
        };

        // Every present cell is checked by its actual variant; a declared
        // type is never trusted over the values it labels.
        let expected = schema.value_type();
        let values = match coerce_column(column, expected) {
            Some(values) => values,
            None => {
                if !config.partial_insert_enabled {
                    return Err(CoreError::TypeMismatch {
                        path: format!("{}.{}", batch.device(), measurement),
                        declared,
                        expected,
                        min_time: batch.min_time(),
                        first_value: batch
                            .first_value_of(index)
                            .map(|value| value.to_string())
                            .unwrap_or_else(|| "null".to_string()),
                    });
                }
                failed.push(FailedMeasurementRecord {
                    index,
                    measurement: measurement.clone(),
                    declared_type: declared,
                    value: batch.first_value_of(index).cloned(),
                    cause: FailureCause::TypeMismatch {
                        declared,
                        expected,
                        min_time: batch.min_time(),
                    },
                });
                continue;
            }
        };

        accepted.push(AcceptedColumn {
            index,
            measurement: measurement.clone(),
            resolved_type: expected,
            values,
        });
    }

    if !failed.is_empty() {
        debug!(
            device = batch.device(),
            failed = failed.len(),
            accepted = accepted.len(),
            "partial insert isolated failing measurements"
        );
    }

    Ok(ValidationOutcome {
        accepted: AcceptedBatch::new(batch.device().to_string(), batch.rows().to_vec(), accepted),
        failed,
    })
}

/// Coerces every present cell of a column to `target`. Returns `None` if
/// any present cell cannot be coerced; absent cells pass through untouched.
fn coerce_column(column: &[Option<Value>], target: ValueType) -> Option<Vec<Option<Value>>> {
    let mut coerced = Vec::with_capacity(column.len());
    for slot in column {
        match slot {
            None => coerced.push(None),
            Some(value) => coerced.push(Some(coerce_value(value, target)?)),
        }
    }
    Some(coerced)
}

/// Coerces one value to `target` following the widening ladder:
/// INT32 -> {INT64, FLOAT, DOUBLE}, INT64 -> DOUBLE, FLOAT -> DOUBLE, and
/// TEXT parsed into any target type. Values already of the target type
/// pass through. Narrowing and boolean/numeric conversions are never
/// performed.
fn coerce_value(value: &Value, target: ValueType) -> Option<Value> {
    if value.value_type() == target {
        return Some(value.clone());
    }
    match (value, target) {
        (Value::Int32(v), ValueType::Int64) => Some(Value::Int64(*v as i64)),
        (Value::Int32(v), ValueType::Float) => Some(Value::Float(*v as f32)),
        (Value::Int32(v), ValueType::Double) => Some(Value::Double(*v as f64)),
        (Value::Int64(v), ValueType::Double) => Some(Value::Double(*v as f64)),
        (Value::Float(v), ValueType::Double) => Some(Value::Double(*v as f64)),
        (Value::Text(text), _) => parse_text(text, target),
        _ => None,
    }
}

/// Parses text-encoded input into a typed value.
fn parse_text(text: &str, target: ValueType) -> Option<Value> {
    match target {
        ValueType::Boolean => text.parse().ok().map(Value::Boolean),
        ValueType::Int32 => text.parse().ok().map(Value::Int32),
        ValueType::Int64 => text.parse().ok().map(Value::Int64),
        ValueType::Float => text.parse().ok().map(Value::Float),
        ValueType::Double => text.parse().ok().map(Value::Double),
        ValueType::Text => Some(Value::Text(text.to_string())),
    }
}
