//! Fixed-capacity, column-oriented write batches.
//!
//! A tablet buffers reconstructed rows for one device: a timestamp column,
//! one typed value buffer per measurement and one null bitmap per column.
//! On reaching capacity (or at stream exhaustion) it is dispatched to the
//! delivery collaborator and reset; buffers are reused across flushes so
//! memory stays bounded over a large series.

use crate::error::{LoadError, Result};
use crate::tsfile::{DataType, Timestamp, Value};
use bitvec::vec::BitVec;

/// Default tablet capacity in rows.
pub const DEFAULT_TABLET_CAPACITY: usize = 64 * 1024;

/// A typed, reusable value buffer for one tablet column.
///
/// Null rows still occupy a slot (holding the type's default) so every
/// buffer stays index-aligned with the timestamp column; the null bitmap is
/// the authority on which slots are real.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    /// Boolean column.
    Boolean(Vec<bool>),
    /// 32-bit integer column.
    Int32(Vec<i32>),
    /// 64-bit integer column.
    Int64(Vec<i64>),
    /// 32-bit float column.
    Float(Vec<f32>),
    /// 64-bit float column.
    Double(Vec<f64>),
    /// Text column.
    Text(Vec<String>),
}

impl ColumnBuffer {
    /// Creates an empty buffer for the given data type.
    ///
    /// # Errors
    ///
    /// Fails for [`DataType::Vector`], which is structural and never holds
    /// column data.
    pub fn for_type(data_type: DataType, capacity: usize) -> Result<Self> {
        Ok(match data_type {
            DataType::Boolean => Self::Boolean(Vec::with_capacity(capacity)),
            DataType::Int32 => Self::Int32(Vec::with_capacity(capacity)),
            DataType::Int64 => Self::Int64(Vec::with_capacity(capacity)),
            DataType::Float => Self::Float(Vec::with_capacity(capacity)),
            DataType::Double => Self::Double(Vec::with_capacity(capacity)),
            DataType::Text => Self::Text(Vec::with_capacity(capacity)),
            DataType::Vector => {
                return Err(LoadError::DecodeError(
                    "Vector is structural and cannot back a tablet column".to_string(),
                ))
            }
        })
    }

    /// Data type of this buffer.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Text(_) => DataType::Text,
        }
    }

    fn push(&mut self, value: Option<&Value>) -> Result<()> {
        match (self, value) {
            (Self::Boolean(buf), Some(Value::Boolean(v))) => buf.push(*v),
            (Self::Boolean(buf), None) => buf.push(false),
            (Self::Int32(buf), Some(Value::Int32(v))) => buf.push(*v),
            (Self::Int32(buf), None) => buf.push(0),
            (Self::Int64(buf), Some(Value::Int64(v))) => buf.push(*v),
            (Self::Int64(buf), None) => buf.push(0),
            (Self::Float(buf), Some(Value::Float(v))) => buf.push(*v),
            (Self::Float(buf), None) => buf.push(0.0),
            (Self::Double(buf), Some(Value::Double(v))) => buf.push(*v),
            (Self::Double(buf), None) => buf.push(0.0),
            (Self::Text(buf), Some(Value::Text(v))) => buf.push(v.clone()),
            (Self::Text(buf), None) => buf.push(String::new()),
            (buf, Some(value)) => {
                return Err(LoadError::DecodeError(format!(
                    "Value {:?} does not fit a {:?} column",
                    value,
                    buf.data_type()
                )))
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        match self {
            Self::Boolean(buf) => buf.clear(),
            Self::Int32(buf) => buf.clear(),
            Self::Int64(buf) => buf.clear(),
            Self::Float(buf) => buf.clear(),
            Self::Double(buf) => buf.clear(),
            Self::Text(buf) => buf.clear(),
        }
    }
}

/// A bounded write batch for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Tablet {
    device: String,
    measurement_ids: Vec<String>,
    capacity: usize,
    timestamps: Vec<Timestamp>,
    columns: Vec<ColumnBuffer>,
    null_bitmaps: Vec<BitVec>,
}

impl Tablet {
    /// Creates an empty tablet for a device and its ordered measurement
    /// columns.
    pub fn new(
        device: impl Into<String>,
        columns: &[(String, DataType)],
        capacity: usize,
    ) -> Result<Self> {
        let mut buffers = Vec::with_capacity(columns.len());
        for (_, data_type) in columns {
            buffers.push(ColumnBuffer::for_type(*data_type, capacity)?);
        }
        Ok(Self {
            device: device.into(),
            measurement_ids: columns.iter().map(|(id, _)| id.clone()).collect(),
            capacity,
            timestamps: Vec::with_capacity(capacity),
            columns: buffers,
            null_bitmaps: vec![BitVec::new(); columns.len()],
        })
    }

    /// Device this tablet belongs to.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Ordered measurement column ids.
    pub fn measurement_ids(&self) -> &[String] {
        &self.measurement_ids
    }

    /// Buffered timestamps.
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Value buffer of column `i`.
    pub fn column(&self, i: usize) -> &ColumnBuffer {
        &self.columns[i]
    }

    /// Returns true if column `i` is null at `row`.
    pub fn is_null(&self, i: usize, row: usize) -> bool {
        self.null_bitmaps[i][row]
    }

    /// Rows currently buffered.
    pub fn row_size(&self) -> usize {
        self.timestamps.len()
    }

    /// Maximum rows before a flush is due.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true once the tablet holds `capacity` rows.
    pub fn is_full(&self) -> bool {
        self.timestamps.len() >= self.capacity
    }

    /// Appends one reconstructed row.
    ///
    /// `fields` must carry one slot per column, in column order; `None`
    /// marks the null bit for that column.
    ///
    /// # Errors
    ///
    /// Fails if the field count or a value's type does not match the
    /// tablet's columns, or if the tablet is already full.
    pub fn add_row(&mut self, timestamp: Timestamp, fields: &[Option<Value>]) -> Result<()> {
        if fields.len() != self.columns.len() {
            return Err(LoadError::DecodeError(format!(
                "Row carries {} fields for a {}-column tablet",
                fields.len(),
                self.columns.len()
            )));
        }
        if self.is_full() {
            return Err(LoadError::DecodeError(
                "Tablet is full and must be flushed before adding rows".to_string(),
            ));
        }
        self.timestamps.push(timestamp);
        for ((column, bitmap), field) in self
            .columns
            .iter_mut()
            .zip(&mut self.null_bitmaps)
            .zip(fields)
        {
            column.push(field.as_ref())?;
            bitmap.push(field.is_none());
        }
        Ok(())
    }

    /// Clears all rows, retaining buffer allocations for reuse.
    pub fn reset(&mut self) {
        self.timestamps.clear();
        for column in &mut self.columns {
            column.clear();
        }
        for bitmap in &mut self.null_bitmaps {
            bitmap.clear();
        }
    }
}
