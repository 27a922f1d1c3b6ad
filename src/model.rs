//! Core data model: timestamps, time ranges, series paths, values, and
//! measurement schemas.
//!
//! Values are a tagged union over the six supported data types. Absence of
//! a value ("no data for this column at this timestamp") is modeled as
//! `Option<Value>` at the batch and chunk level, never as a sentinel value.

use std::fmt;

/// Timestamp in the store's native resolution (milliseconds).
pub type Timestamp = i64;

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    /// Start timestamp (inclusive).
    pub start: Timestamp,
    /// End timestamp (exclusive).
    pub end: Timestamp,
}

impl TimeRange {
    /// Creates a new time range `[start, end)`.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Returns true if the range contains the timestamp.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Returns true if this range overlaps the other range.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Identifies one series: a measurement under a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesPath {
    /// Device identifier.
    pub device: String,
    /// Measurement name.
    pub measurement: String,
}

impl SeriesPath {
    /// Creates a new series path.
    pub fn new(device: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            measurement: measurement.into(),
        }
    }
}

impl fmt::Display for SeriesPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.measurement)
    }
}

/// Declared data type of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean.
    Boolean,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit IEEE-754 floating point.
    Float,
    /// 64-bit IEEE-754 floating point.
    Double,
    /// UTF-8 text.
    Text,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::Int32 => "INT32",
            ValueType::Int64 => "INT64",
            ValueType::Float => "FLOAT",
            ValueType::Double => "DOUBLE",
            ValueType::Text => "TEXT",
        };
        f.write_str(name)
    }
}

/// A single typed value.
///
/// Different types are never equal; there is no implicit coercion in
/// equality. Coercion is an explicit operation owned by the ingestion
/// validator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer value.
    Int32(i32),
    /// 64-bit signed integer value.
    Int64(i64),
    /// 32-bit floating point value.
    Float(f32),
    /// 64-bit floating point value.
    Double(f64),
    /// UTF-8 text value.
    Text(String),
}

impl Value {
    /// Returns the type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
        }
    }

    /// Returns the double representation of a numeric value, if any.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Column encoding declared for a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Plain, unencoded values.
    #[default]
    Plain,
    /// Run-length encoding.
    Rle,
    /// Delta-of-delta timestamp encoding.
    TwoDiff,
    /// Gorilla XOR encoding for floating point values.
    Gorilla,
}

/// Compression codec declared for a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionCodec {
    /// No compression.
    #[default]
    Uncompressed,
    /// Snappy block compression.
    Snappy,
    /// LZ4 block compression.
    Lz4,
    /// Gzip compression.
    Gzip,
}

/// Declared schema of one measurement: name, value type, encoding, and
/// compression. Immutable once registered; the core holds read-only copies
/// obtained through [`SchemaLookup`](crate::ingest::SchemaLookup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSchema {
    measurement: String,
    value_type: ValueType,
    encoding: Encoding,
    compression: CompressionCodec,
}

impl MeasurementSchema {
    /// Creates a new measurement schema.
    pub fn new(
        measurement: impl Into<String>,
        value_type: ValueType,
        encoding: Encoding,
        compression: CompressionCodec,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            value_type,
            encoding,
            compression,
        }
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Returns the declared value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns the declared encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns the declared compression codec.
    pub fn compression(&self) -> CompressionCodec {
        self.compression
    }
}
