//! Core model types for the columnar TsFile format.
//!
//! A file stores, per device, independent compressed chunks of timestamped
//! values per measurement, or a shared time column plus value columns for
//! aligned devices. These types describe that model; the binary layout lives
//! in [`format`], the structural pass in [`scan`] and the metadata pass in
//! [`metadata`].

pub mod format;
pub mod metadata;
pub mod scan;

use crate::error::{LoadError, Result};
use std::fmt;

/// Timestamp in the store's native resolution (milliseconds).
pub type Timestamp = i64;

/// An inclusive time range `[start, end]`.
///
/// Deletions and chunk statistics both use inclusive bounds, matching the
/// sidecar modification log semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start timestamp (inclusive).
    pub start: Timestamp,
    /// End timestamp (inclusive).
    pub end: Timestamp,
}

impl TimeRange {
    /// Creates a new inclusive time range.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Returns true if `ts` falls within this range.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Returns true if the two ranges share at least one timestamp.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns true if this range fully covers `other`.
    pub fn covers(&self, other: &TimeRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }
}

/// Declared data type of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Boolean values.
    Boolean = 0,
    /// 32-bit signed integers.
    Int32 = 1,
    /// 64-bit signed integers.
    Int64 = 2,
    /// 32-bit floats.
    Float = 3,
    /// 64-bit floats.
    Double = 4,
    /// UTF-8 strings.
    Text = 5,
    /// Structural sentinel for the shared time column of an aligned device.
    /// Carries no data of its own.
    Vector = 6,
}

impl DataType {
    /// Creates a DataType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Boolean),
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::Float),
            4 => Some(Self::Double),
            5 => Some(Self::Text),
            6 => Some(Self::Vector),
            _ => None,
        }
    }
}

/// Declared value encoding of a chunk.
///
/// Only [`Encoding::Plain`] payloads are decoded by this pipeline; other
/// encodings are still indexed during schema discovery but fail with a
/// decode error if their payload is ever loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Encoding {
    /// Plain fixed-width (or length-prefixed, for text) encoding.
    #[default]
    Plain = 0,
    /// Run-length encoding.
    Rle = 1,
    /// Delta-of-delta encoding.
    DeltaBinary = 2,
    /// Gorilla XOR encoding.
    Gorilla = 3,
}

impl Encoding {
    /// Creates an Encoding from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Plain),
            1 => Some(Self::Rle),
            2 => Some(Self::DeltaBinary),
            3 => Some(Self::Gorilla),
            _ => None,
        }
    }
}

/// Declared compression of a chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Compression {
    /// No compression.
    #[default]
    Uncompressed = 0,
    /// Snappy block compression.
    Snappy = 1,
    /// LZ4 block compression.
    Lz4 = 2,
}

impl Compression {
    /// Creates a Compression from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Uncompressed),
            1 => Some(Self::Snappy),
            2 => Some(Self::Lz4),
            _ => None,
        }
    }
}

/// Schema of one measurement: id, data type, encoding and compression.
///
/// Collected into a per-device set during the structural pass; set semantics
/// deduplicate repeated declarations across chunk groups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeasurementSchema {
    /// Measurement identifier. Empty for the shared time column of an
    /// aligned device.
    pub measurement_id: String,
    /// Declared data type.
    pub data_type: DataType,
    /// Declared value encoding.
    pub encoding: Encoding,
    /// Declared payload compression.
    pub compression: Compression,
}

impl MeasurementSchema {
    /// Creates a new measurement schema.
    pub fn new(
        measurement_id: impl Into<String>,
        data_type: DataType,
        encoding: Encoding,
        compression: Compression,
    ) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            data_type,
            encoding,
            compression,
        }
    }
}

/// A structured series path: device plus measurement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesPath {
    /// Device identifier, e.g. `root.sg.d1`.
    pub device: String,
    /// Measurement identifier, e.g. `s1`.
    pub measurement: String,
}

impl SeriesPath {
    /// Creates a series path from device and measurement parts.
    pub fn new(device: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            measurement: measurement.into(),
        }
    }

    /// Parses a full dotted path into device and measurement.
    ///
    /// The last `.`-separated segment is the measurement, everything before
    /// it the device.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidPath`] if there is no separator or either
    /// side is empty.
    pub fn parse(full: &str) -> Result<Self> {
        match full.rsplit_once('.') {
            Some((device, measurement)) if !device.is_empty() && !measurement.is_empty() => {
                Ok(Self::new(device, measurement))
            }
            _ => Err(LoadError::InvalidPath(full.to_string())),
        }
    }
}

impl fmt::Display for SeriesPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.measurement)
    }
}

/// A typed scalar value read from a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer value.
    Int32(i32),
    /// 64-bit integer value.
    Int64(i64),
    /// 32-bit float value.
    Float(f32),
    /// 64-bit float value.
    Double(f64),
    /// Text value.
    Text(String),
}

impl Value {
    /// Returns the data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Text(_) => DataType::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_contains_bounds() {
        let range = TimeRange::new(10, 20);
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
    }

    #[test]
    fn test_time_range_overlap_and_cover() {
        let range = TimeRange::new(10, 20);
        assert!(range.overlaps(&TimeRange::new(20, 30)));
        assert!(range.overlaps(&TimeRange::new(0, 10)));
        assert!(!range.overlaps(&TimeRange::new(21, 30)));
        assert!(range.covers(&TimeRange::new(10, 20)));
        assert!(!range.covers(&TimeRange::new(10, 21)));
    }

    #[test]
    fn test_series_path_parse() {
        let path = SeriesPath::parse("root.sg.d1.s1").unwrap();
        assert_eq!(path.device, "root.sg.d1");
        assert_eq!(path.measurement, "s1");
        assert_eq!(path.to_string(), "root.sg.d1.s1");

        assert!(SeriesPath::parse("nodots").is_err());
        assert!(SeriesPath::parse(".s1").is_err());
        assert!(SeriesPath::parse("d1.").is_err());
    }

    #[test]
    fn test_data_type_from_u8() {
        assert_eq!(DataType::from_u8(6), Some(DataType::Vector));
        assert_eq!(DataType::from_u8(7), None);
    }
}
