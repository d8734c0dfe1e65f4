//! Binary layout of the columnar TsFile format.
//!
//! A file is a fixed magic header followed by a stream of one-byte markers,
//! each introducing a record, terminated by a separator marker. The trailing
//! index after the separator is not consumed by this pipeline, which decodes
//! sequentially instead.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  File Header (7 bytes)                                      │
//! │  - Magic: "TsFile" (6 bytes)                                │
//! │  - Version: u8 = 3                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Marker stream (repeated)                                   │
//! │  - 0x00 chunk group header: device id                       │
//! │  - 0x01/0x05 chunk header (+0x40 time, +0x80 value variant) │
//! │  - 0x04 operation index: u64, read and discarded            │
//! │  - 0x02 separator: end of data section                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Trailing index (ignored by the loader)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Chunk payloads are sequences of pages, each carrying its own point count,
//! time statistics and CRC32. All integers are little-endian.

use crate::error::{LoadError, Result};
use crate::tsfile::{Compression, DataType, Encoding, Timestamp, Value};
use std::io::{Read, Write};

/// Magic bytes for the file header: "TsFile".
pub const MAGIC: [u8; 6] = *b"TsFile";

/// Current file format version.
pub const VERSION: u8 = 3;

/// Size of the file header (magic plus version byte).
pub const FILE_HEADER_SIZE: u64 = 7;

/// Size of a serialized page header in bytes.
pub const PAGE_HEADER_SIZE: u64 = 28;

/// Marker bytes of the data section.
pub mod marker {
    /// Introduces a chunk group header (device boundary).
    pub const CHUNK_GROUP_HEADER: u8 = 0x00;
    /// Introduces a plain multi-page chunk header.
    pub const CHUNK_HEADER: u8 = 0x01;
    /// Terminates the data section.
    pub const SEPARATOR: u8 = 0x02;
    /// Introduces an operation index record (u64 plan index).
    pub const OPERATION_INDEX_RANGE: u8 = 0x04;
    /// Single-page optimization of [`CHUNK_HEADER`].
    pub const ONLY_ONE_PAGE_CHUNK_HEADER: u8 = 0x05;
    /// Bit set on chunk-header markers of shared time chunks.
    pub const TIME_CHUNK_MASK: u8 = 0x40;
    /// Bit set on chunk-header markers of aligned value chunks.
    pub const VALUE_CHUNK_MASK: u8 = 0x80;
    /// Time chunk header marker.
    pub const TIME_CHUNK_HEADER: u8 = CHUNK_HEADER | TIME_CHUNK_MASK;
    /// Single-page time chunk header marker.
    pub const ONLY_ONE_PAGE_TIME_CHUNK_HEADER: u8 = ONLY_ONE_PAGE_CHUNK_HEADER | TIME_CHUNK_MASK;
    /// Value chunk header marker.
    pub const VALUE_CHUNK_HEADER: u8 = CHUNK_HEADER | VALUE_CHUNK_MASK;
    /// Single-page value chunk header marker.
    pub const ONLY_ONE_PAGE_VALUE_CHUNK_HEADER: u8 = ONLY_ONE_PAGE_CHUNK_HEADER | VALUE_CHUNK_MASK;
}

/// Role of a chunk within its chunk group, derived from the marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    /// Independent (time, value) chunk of a non-aligned measurement.
    Plain,
    /// Shared time column of an aligned device.
    Time,
    /// Value column of an aligned device.
    Value,
}

impl ChunkRole {
    /// Classifies a chunk-header marker byte, or returns `None` if the byte
    /// is not a chunk-header marker at all.
    pub fn from_marker(m: u8) -> Option<Self> {
        let base = m & !(marker::TIME_CHUNK_MASK | marker::VALUE_CHUNK_MASK);
        if base != marker::CHUNK_HEADER && base != marker::ONLY_ONE_PAGE_CHUNK_HEADER {
            return None;
        }
        match m & (marker::TIME_CHUNK_MASK | marker::VALUE_CHUNK_MASK) {
            0 => Some(Self::Plain),
            marker::TIME_CHUNK_MASK => Some(Self::Time),
            marker::VALUE_CHUNK_MASK => Some(Self::Value),
            _ => None,
        }
    }
}

fn read_exact_buf<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    writer.write_all(&(bytes.len() as u16).to_le_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R, what: &str) -> Result<String> {
    let len = u16::from_le_bytes(read_exact_buf::<_, 2>(reader)?) as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| LoadError::DecodeError(format!("Invalid UTF-8 in {}: {}", what, e)))
}

/// Validates the fixed file header (magic plus version byte).
///
/// # Errors
///
/// Returns [`LoadError::InvalidMagic`] or [`LoadError::UnsupportedVersion`].
pub fn read_file_header<R: Read>(reader: &mut R) -> Result<()> {
    let magic: [u8; 6] = read_exact_buf(reader)?;
    if magic != MAGIC {
        return Err(LoadError::InvalidMagic(magic));
    }
    let version = read_exact_buf::<_, 1>(reader)?[0];
    if version > VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Writes the fixed file header.
pub fn write_file_header<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[VERSION])?;
    Ok(())
}

/// Chunk group header: marks a device boundary in the marker stream.
///
/// All chunks up to the next chunk group header (or the separator) belong to
/// this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroupHeader {
    /// Device identifier owning the following chunks.
    pub device_id: String,
}

impl ChunkGroupHeader {
    /// Creates a new chunk group header.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// Writes the header payload (the marker byte is written separately).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_string(writer, &self.device_id)
    }

    /// Reads the header payload following a chunk-group marker.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            device_id: read_string(reader, "device id")?,
        })
    }
}

/// Chunk header: declares one measurement chunk and the size of its payload.
///
/// Time chunks of aligned devices carry an empty measurement id and the
/// [`DataType::Vector`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Measurement identifier (empty for shared time chunks).
    pub measurement_id: String,
    /// Declared data type.
    pub data_type: DataType,
    /// Declared value encoding.
    pub encoding: Encoding,
    /// Declared payload compression.
    pub compression: Compression,
    /// Payload size in bytes (the pages following this header).
    pub data_size: u32,
}

impl ChunkHeader {
    /// Creates a new chunk header.
    pub fn new(
        measurement_id: impl Into<String>,
        data_type: DataType,
        encoding: Encoding,
        compression: Compression,
        data_size: u32,
    ) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            data_type,
            encoding,
            compression,
            data_size,
        }
    }

    /// Writes the header payload (the marker byte is written separately).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_string(writer, &self.measurement_id)?;
        writer.write_all(&[
            self.data_type as u8,
            self.encoding as u8,
            self.compression as u8,
        ])?;
        writer.write_all(&self.data_size.to_le_bytes())?;
        Ok(())
    }

    /// Reads the header payload following a chunk-header marker.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let measurement_id = read_string(reader, "measurement id")?;
        let meta: [u8; 3] = read_exact_buf(reader)?;
        let data_type = DataType::from_u8(meta[0])
            .ok_or_else(|| LoadError::DecodeError(format!("Unknown data type {}", meta[0])))?;
        let encoding = Encoding::from_u8(meta[1])
            .ok_or_else(|| LoadError::DecodeError(format!("Unknown encoding {}", meta[1])))?;
        let compression = Compression::from_u8(meta[2])
            .ok_or_else(|| LoadError::DecodeError(format!("Unknown compression {}", meta[2])))?;
        let data_size = u32::from_le_bytes(read_exact_buf(reader)?);
        Ok(Self {
            measurement_id,
            data_type,
            encoding,
            compression,
            data_size,
        })
    }
}

/// Page header: point count, time statistics and payload sizes.
///
/// ```text
/// Offset  Size    Field
/// ------  ----    -----
/// 0x00    4       point_count (u32 LE)
/// 0x04    8       min_timestamp (i64 LE)
/// 0x0C    8       max_timestamp (i64 LE)
/// 0x14    4       time_size (u32 LE)
/// 0x18    4       value_size (u32 LE)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Number of points (rows) in the page.
    pub point_count: u32,
    /// Minimum timestamp in the page.
    pub min_ts: Timestamp,
    /// Maximum timestamp in the page.
    pub max_ts: Timestamp,
    /// Size of the time bytes (0 for value pages).
    pub time_size: u32,
    /// Size of the value bytes (0 for time pages).
    pub value_size: u32,
}

impl PageHeader {
    /// Writes the header.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.point_count.to_le_bytes())?;
        writer.write_all(&self.min_ts.to_le_bytes())?;
        writer.write_all(&self.max_ts.to_le_bytes())?;
        writer.write_all(&self.time_size.to_le_bytes())?;
        writer.write_all(&self.value_size.to_le_bytes())?;
        Ok(())
    }

    /// Reads a header.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let buf: [u8; PAGE_HEADER_SIZE as usize] = read_exact_buf(reader)?;
        Ok(Self {
            point_count: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            min_ts: i64::from_le_bytes(buf[4..12].try_into().unwrap()),
            max_ts: i64::from_le_bytes(buf[12..20].try_into().unwrap()),
            time_size: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            value_size: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        })
    }

    /// Number of payload bytes following the header (data plus CRC32).
    pub fn body_size(&self) -> u64 {
        self.time_size as u64 + self.value_size as u64 + 4
    }
}

/// One page of a chunk payload: header, raw time and value bytes, CRC32.
///
/// The CRC covers the serialized header plus both data sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Page header.
    pub header: PageHeader,
    /// Plain-encoded timestamps (empty for value pages).
    pub time_data: Vec<u8>,
    /// Value bytes (empty for time pages).
    pub value_data: Vec<u8>,
    /// CRC32 over header and data.
    pub crc32: u32,
}

impl Page {
    /// Creates a page, computing its CRC.
    pub fn new(
        point_count: u32,
        min_ts: Timestamp,
        max_ts: Timestamp,
        time_data: Vec<u8>,
        value_data: Vec<u8>,
    ) -> Self {
        let header = PageHeader {
            point_count,
            min_ts,
            max_ts,
            time_size: time_data.len() as u32,
            value_size: value_data.len() as u32,
        };
        let mut page = Self {
            header,
            time_data,
            value_data,
            crc32: 0,
        };
        page.crc32 = page.calculate_crc();
        page
    }

    fn calculate_crc(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.header.point_count.to_le_bytes());
        hasher.update(&self.header.min_ts.to_le_bytes());
        hasher.update(&self.header.max_ts.to_le_bytes());
        hasher.update(&self.header.time_size.to_le_bytes());
        hasher.update(&self.header.value_size.to_le_bytes());
        hasher.update(&self.time_data);
        hasher.update(&self.value_data);
        hasher.finalize()
    }

    /// Serialized size of this page in bytes.
    pub fn serialized_size(&self) -> u32 {
        PAGE_HEADER_SIZE as u32 + self.header.time_size + self.header.value_size + 4
    }

    /// Writes the full page.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_all(&self.time_data)?;
        writer.write_all(&self.value_data)?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        Ok(())
    }

    /// Reads a full page and verifies its CRC.
    ///
    /// `remaining` is the number of chunk payload bytes left, this page's
    /// header included. The declared section sizes are checked against it
    /// before anything is allocated, so a corrupt length field cannot
    /// demand gigabytes.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DecodeError`] if the declared sizes exceed
    /// `remaining` and [`LoadError::ChecksumMismatch`] if verification
    /// fails.
    pub fn read_from<R: Read>(reader: &mut R, remaining: u64) -> Result<Self> {
        let header = PageHeader::read_from(reader)?;
        if PAGE_HEADER_SIZE + header.body_size() > remaining {
            return Err(LoadError::DecodeError(format!(
                "Page declares {} body bytes but only {} remain in the chunk",
                header.body_size(),
                remaining.saturating_sub(PAGE_HEADER_SIZE)
            )));
        }
        let mut time_data = vec![0u8; header.time_size as usize];
        reader.read_exact(&mut time_data)?;
        let mut value_data = vec![0u8; header.value_size as usize];
        reader.read_exact(&mut value_data)?;
        let crc32 = u32::from_le_bytes(read_exact_buf(reader)?);

        let page = Self {
            header,
            time_data,
            value_data,
            crc32,
        };
        let actual = page.calculate_crc();
        if crc32 != actual {
            return Err(LoadError::ChecksumMismatch {
                expected: crc32,
                actual,
            });
        }
        Ok(page)
    }
}

/// Encodes timestamps as plain 8-byte LE values.
pub fn encode_timestamps(timestamps: &[Timestamp]) -> Vec<u8> {
    let mut out = Vec::with_capacity(timestamps.len() * 8);
    for ts in timestamps {
        out.extend_from_slice(&ts.to_le_bytes());
    }
    out
}

/// Decodes plain 8-byte LE timestamps.
pub fn decode_timestamps(data: &[u8], count: usize) -> Result<Vec<Timestamp>> {
    if data.len() != count * 8 {
        return Err(LoadError::DecodeError(format!(
            "Time section holds {} bytes, expected {} for {} points",
            data.len(),
            count * 8,
            count
        )));
    }
    Ok(data
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Boolean(v) => out.push(*v as u8),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Text(v) => {
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
    }
}

fn decode_value<R: Read>(reader: &mut R, data_type: DataType) -> Result<Value> {
    Ok(match data_type {
        DataType::Boolean => Value::Boolean(read_exact_buf::<_, 1>(reader)?[0] != 0),
        DataType::Int32 => Value::Int32(i32::from_le_bytes(read_exact_buf(reader)?)),
        DataType::Int64 => Value::Int64(i64::from_le_bytes(read_exact_buf(reader)?)),
        DataType::Float => Value::Float(f32::from_le_bytes(read_exact_buf(reader)?)),
        DataType::Double => Value::Double(f64::from_le_bytes(read_exact_buf(reader)?)),
        DataType::Text => {
            let len = u32::from_le_bytes(read_exact_buf(reader)?) as usize;
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes)?;
            Value::Text(String::from_utf8(bytes).map_err(|e| {
                LoadError::DecodeError(format!("Invalid UTF-8 in text value: {}", e))
            })?)
        }
        DataType::Vector => {
            return Err(LoadError::DecodeError(
                "Vector is a structural sentinel and carries no values".to_string(),
            ))
        }
    })
}

/// Encodes a dense value column (every slot present).
pub fn encode_values(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        encode_value(&mut out, value);
    }
    out
}

/// Decodes a dense value column.
pub fn decode_values(data: &[u8], count: usize, data_type: DataType) -> Result<Vec<Value>> {
    let mut cursor = std::io::Cursor::new(data);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(decode_value(&mut cursor, data_type)?);
    }
    Ok(out)
}

/// Encodes a sparse value column of an aligned value page: a presence bitmap
/// (LSB-first, one bit per slot) followed by the present values, packed.
pub fn encode_sparse_values(values: &[Option<Value>]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        if value.is_some() {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    for value in values.iter().flatten() {
        encode_value(&mut out, value);
    }
    out
}

/// Decodes a sparse value column (presence bitmap plus packed values).
pub fn decode_sparse_values(
    data: &[u8],
    count: usize,
    data_type: DataType,
) -> Result<Vec<Option<Value>>> {
    let bitmap_len = count.div_ceil(8);
    if data.len() < bitmap_len {
        return Err(LoadError::DecodeError(format!(
            "Value section too short for {}-slot presence bitmap",
            count
        )));
    }
    let (bitmap, packed) = data.split_at(bitmap_len);
    let mut cursor = std::io::Cursor::new(packed);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        if bitmap[i / 8] & (1 << (i % 8)) != 0 {
            out.push(Some(decode_value(&mut cursor, data_type)?));
        } else {
            out.push(None);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_header_roundtrip() {
        let header = ChunkHeader::new(
            "s1",
            DataType::Double,
            Encoding::Plain,
            Compression::Uncompressed,
            128,
        );
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        let read = ChunkHeader::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(read, header);
    }

    #[test]
    fn test_page_crc_detects_corruption() {
        let page = Page::new(2, 1, 2, encode_timestamps(&[1, 2]), vec![7, 7]);
        let mut buf = Vec::new();
        page.write_to(&mut buf).unwrap();

        let limit = buf.len() as u64;
        assert_eq!(Page::read_from(&mut buf.as_slice(), limit).unwrap(), page);

        // Flip a data byte.
        let data_offset = PAGE_HEADER_SIZE as usize + 3;
        buf[data_offset] ^= 0xff;
        assert!(matches!(
            Page::read_from(&mut buf.as_slice(), limit),
            Err(LoadError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_page_length_rejected_before_read() {
        let page = Page::new(2, 1, 2, encode_timestamps(&[1, 2]), vec![7, 7]);
        let mut buf = Vec::new();
        page.write_to(&mut buf).unwrap();

        // Corrupt the time_size field to claim 4 GiB.
        buf[20..24].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Page::read_from(&mut buf.as_slice(), buf.len() as u64),
            Err(LoadError::DecodeError(_))
        ));
    }

    #[test]
    fn test_chunk_role_classification() {
        assert_eq!(
            ChunkRole::from_marker(marker::CHUNK_HEADER),
            Some(ChunkRole::Plain)
        );
        assert_eq!(
            ChunkRole::from_marker(marker::ONLY_ONE_PAGE_TIME_CHUNK_HEADER),
            Some(ChunkRole::Time)
        );
        assert_eq!(
            ChunkRole::from_marker(marker::VALUE_CHUNK_HEADER),
            Some(ChunkRole::Value)
        );
        assert_eq!(ChunkRole::from_marker(marker::SEPARATOR), None);
        assert_eq!(ChunkRole::from_marker(0xff), None);
    }

    #[test]
    fn test_sparse_values_roundtrip() {
        let values = vec![
            Some(Value::Int32(1)),
            None,
            Some(Value::Int32(3)),
            None,
            None,
            Some(Value::Int32(9)),
        ];
        let data = encode_sparse_values(&values);
        let decoded = decode_sparse_values(&data, values.len(), DataType::Int32).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_text_values_roundtrip() {
        let values = vec![Value::Text("a".into()), Value::Text("long-ish".into())];
        let data = encode_values(&values);
        assert_eq!(decode_values(&data, 2, DataType::Text).unwrap(), values);
    }
}
