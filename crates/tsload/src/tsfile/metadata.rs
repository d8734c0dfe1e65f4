//! Metadata pass and on-demand chunk loading.
//!
//! The structural pass ([`crate::tsfile::scan`]) only discovers schemas. This
//! second, independent pass collects the per-chunk descriptors (offset, time
//! range, declared types) that value decoding needs, again sequentially and
//! without consulting the file's trailing index. Page payloads stay on disk
//! until a series reader asks the [`ChunkLoader`] for them; decoded chunks
//! are cached by offset for the lifetime of one file's processing, so the
//! shared time chunk of an aligned device is decoded once however many value
//! columns read it.

use crate::error::{LoadError, Result};
use crate::tsfile::format::{
    self, decode_sparse_values, decode_timestamps, decode_values, marker, ChunkGroupHeader,
    ChunkHeader, ChunkRole, Page, PageHeader,
};
use crate::tsfile::{Compression, DataType, Encoding, SeriesPath, TimeRange, Timestamp, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;

/// Descriptor of one chunk run: where its pages live and what they hold.
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Measurement identifier (empty for shared time chunks).
    pub measurement_id: String,
    /// Role of the chunk within its group.
    pub role: ChunkRole,
    /// Declared data type.
    pub data_type: DataType,
    /// Declared value encoding.
    pub encoding: Encoding,
    /// Declared payload compression.
    pub compression: Compression,
    /// File offset of the first page.
    pub offset: u64,
    /// Payload size in bytes.
    pub data_size: u32,
    /// Time range covered by the chunk's pages.
    pub time_range: TimeRange,
    /// Time ranges logically removed by reconciled deletions. Consulted at
    /// read time; the cached decoded chunk itself is never rewritten.
    pub deleted: Vec<TimeRange>,
}

impl ChunkDescriptor {
    /// Returns true if `ts` falls inside a reconciled deletion.
    pub fn is_deleted_at(&self, ts: Timestamp) -> bool {
        self.deleted.iter().any(|range| range.contains(ts))
    }
}

/// Per-series chunk metadata, tagged by layout.
///
/// Aligned metadata pairs the shared time chunk with the value chunks of the
/// same run; a per-path query carries exactly the one value column the path
/// names.
#[derive(Debug, Clone)]
pub enum ChunkMetadata {
    /// Independent (time, value) chunk of a non-aligned measurement.
    Plain(ChunkDescriptor),
    /// Aligned run: one shared time chunk plus value chunks.
    Aligned {
        /// The shared time chunk.
        time: ChunkDescriptor,
        /// Value columns of the run.
        values: Vec<ChunkDescriptor>,
    },
}

impl ChunkMetadata {
    /// Data type of the series this metadata describes.
    pub fn data_type(&self) -> DataType {
        match self {
            ChunkMetadata::Plain(desc) => desc.data_type,
            ChunkMetadata::Aligned { values, .. } => values
                .first()
                .map(|v| v.data_type)
                .unwrap_or(DataType::Vector),
        }
    }
}

/// One aligned run as stored in the file: time chunk then value chunks.
#[derive(Debug, Clone)]
struct AlignedRun {
    time: ChunkDescriptor,
    values: Vec<ChunkDescriptor>,
}

#[derive(Debug, Default)]
struct DeviceChunks {
    plain: BTreeMap<String, Vec<ChunkDescriptor>>,
    aligned: Vec<AlignedRun>,
}

/// Chunk metadata index for one file, built by a sequential pass.
#[derive(Debug)]
pub struct MetadataQuerier {
    devices: BTreeMap<String, DeviceChunks>,
}

impl MetadataQuerier {
    /// Builds the index by walking the file's marker stream, reading page
    /// headers for statistics and skipping page bodies.
    pub fn build(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        format::read_file_header(&mut reader)?;

        let mut devices: BTreeMap<String, DeviceChunks> = BTreeMap::new();
        let mut current_device: Option<String> = None;

        loop {
            let marker_offset = reader.stream_position()?;
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            let m = byte[0];

            if m == marker::SEPARATOR {
                break;
            }

            if let Some(role) = ChunkRole::from_marker(m) {
                let header = ChunkHeader::read_from(&mut reader)?;
                let device = current_device.clone().ok_or_else(|| {
                    LoadError::DecodeError(format!(
                        "Chunk header at offset {} precedes any chunk group header",
                        marker_offset
                    ))
                })?;
                let desc = read_chunk_descriptor(&mut reader, role, header)?;
                let entry = devices.entry(device).or_default();
                match role {
                    ChunkRole::Plain => entry
                        .plain
                        .entry(desc.measurement_id.clone())
                        .or_default()
                        .push(desc),
                    ChunkRole::Time => entry.aligned.push(AlignedRun {
                        time: desc,
                        values: Vec::new(),
                    }),
                    ChunkRole::Value => {
                        let run = entry.aligned.last_mut().ok_or_else(|| {
                            LoadError::DecodeError(format!(
                                "Value chunk at offset {} has no preceding time chunk",
                                marker_offset
                            ))
                        })?;
                        run.values.push(desc);
                    }
                }
                continue;
            }

            match m {
                marker::CHUNK_GROUP_HEADER => {
                    let group = ChunkGroupHeader::read_from(&mut reader)?;
                    current_device = Some(group.device_id);
                }
                marker::OPERATION_INDEX_RANGE => {
                    let mut buf = [0u8; 8];
                    reader.read_exact(&mut buf)?;
                }
                other => {
                    return Err(LoadError::UnexpectedMarker {
                        marker: other,
                        offset: marker_offset,
                    })
                }
            }
        }

        Ok(Self { devices })
    }

    /// Returns the ordered chunk metadata for a series, possibly empty when
    /// the series has no data in this file (sparse schema across groups).
    pub fn chunk_metadata(&self, path: &SeriesPath) -> Vec<ChunkMetadata> {
        let Some(device) = self.devices.get(&path.device) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if let Some(chunks) = device.plain.get(&path.measurement) {
            out.extend(chunks.iter().cloned().map(ChunkMetadata::Plain));
        }
        for run in &device.aligned {
            if let Some(value) = run
                .values
                .iter()
                .find(|v| v.measurement_id == path.measurement)
            {
                out.push(ChunkMetadata::Aligned {
                    time: run.time.clone(),
                    values: vec![value.clone()],
                });
            }
        }
        out
    }

    /// Last declared data type of a series, independent of whether any chunk
    /// data survived reconciliation. Used to advertise the output schema of
    /// empty series readers.
    pub fn declared_data_type(&self, path: &SeriesPath) -> Option<DataType> {
        let device = self.devices.get(&path.device)?;
        let plain = device
            .plain
            .get(&path.measurement)
            .and_then(|chunks| chunks.last().map(|c| c.data_type));
        if plain.is_some() {
            return plain;
        }
        device
            .aligned
            .iter()
            .rev()
            .flat_map(|run| run.values.iter().rev())
            .find(|v| v.measurement_id == path.measurement)
            .map(|v| v.data_type)
    }
}

/// Reads page headers across one chunk payload to derive its statistics,
/// leaving the reader positioned after the payload.
fn read_chunk_descriptor<R: Read + Seek>(
    reader: &mut R,
    role: ChunkRole,
    header: ChunkHeader,
) -> Result<ChunkDescriptor> {
    let offset = reader.stream_position()?;
    let end = offset + header.data_size as u64;
    let mut min_ts = Timestamp::MAX;
    let mut max_ts = Timestamp::MIN;

    let mut pos = offset;
    while pos < end {
        let page_header = PageHeader::read_from(reader)?;
        min_ts = min_ts.min(page_header.min_ts);
        max_ts = max_ts.max(page_header.max_ts);
        pos = reader.seek(SeekFrom::Current(page_header.body_size() as i64))?;
    }
    if pos != end {
        return Err(LoadError::DecodeError(format!(
            "Chunk payload at offset {} overruns its declared size",
            offset
        )));
    }

    Ok(ChunkDescriptor {
        measurement_id: header.measurement_id,
        role,
        data_type: header.data_type,
        encoding: header.encoding,
        compression: header.compression,
        offset,
        data_size: header.data_size,
        time_range: TimeRange::new(min_ts, max_ts),
        deleted: Vec::new(),
    })
}

/// Fully decoded chunk payload, shape depending on the chunk's role.
#[derive(Debug)]
pub enum DecodedChunk {
    /// Plain chunk: parallel timestamps and dense values.
    Plain {
        /// Point timestamps.
        timestamps: Vec<Timestamp>,
        /// One value per timestamp.
        values: Vec<Value>,
    },
    /// Shared time chunk of an aligned run.
    Time(Vec<Timestamp>),
    /// Value chunk of an aligned run: one slot per shared timestamp.
    Values(Vec<Option<Value>>),
}

/// Decodes chunk payloads on demand, caching decoded chunks by offset.
///
/// The cache lives as long as one file's processing; deletions are applied
/// by the series readers, never baked into cached data, so readers with
/// different deletion views can share an entry.
#[derive(Debug)]
pub struct ChunkLoader {
    reader: BufReader<File>,
    cache: HashMap<u64, Rc<DecodedChunk>>,
}

impl ChunkLoader {
    /// Opens a loader over the given file.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            cache: HashMap::new(),
        })
    }

    /// Loads and decodes the chunk a descriptor points at, hitting the cache
    /// when the offset was decoded before.
    ///
    /// # Errors
    ///
    /// Fails with [`LoadError::DecodeError`] for payload encodings or
    /// compressions this pipeline does not decode, and with checksum or I/O
    /// errors from the page reads.
    pub fn load(&mut self, desc: &ChunkDescriptor) -> Result<Rc<DecodedChunk>> {
        if let Some(cached) = self.cache.get(&desc.offset) {
            return Ok(Rc::clone(cached));
        }

        if desc.encoding != Encoding::Plain {
            return Err(LoadError::DecodeError(format!(
                "Unsupported encoding {:?} for chunk of {:?}",
                desc.encoding, desc.measurement_id
            )));
        }
        if desc.compression != Compression::Uncompressed {
            return Err(LoadError::DecodeError(format!(
                "Unsupported compression {:?} for chunk of {:?}",
                desc.compression, desc.measurement_id
            )));
        }

        self.reader.seek(SeekFrom::Start(desc.offset))?;
        let end = desc.offset + desc.data_size as u64;

        let mut timestamps = Vec::new();
        let mut dense_values = Vec::new();
        let mut sparse_values = Vec::new();

        let mut pos = desc.offset;
        while pos < end {
            let page = Page::read_from(&mut self.reader, end - pos)?;
            let count = page.header.point_count as usize;
            match desc.role {
                ChunkRole::Plain => {
                    timestamps.extend(decode_timestamps(&page.time_data, count)?);
                    dense_values.extend(decode_values(&page.value_data, count, desc.data_type)?);
                }
                ChunkRole::Time => {
                    timestamps.extend(decode_timestamps(&page.time_data, count)?);
                }
                ChunkRole::Value => {
                    sparse_values.extend(decode_sparse_values(
                        &page.value_data,
                        count,
                        desc.data_type,
                    )?);
                }
            }
            pos += page.serialized_size() as u64;
        }

        let decoded = Rc::new(match desc.role {
            ChunkRole::Plain => DecodedChunk::Plain {
                timestamps,
                values: dense_values,
            },
            ChunkRole::Time => DecodedChunk::Time(timestamps),
            ChunkRole::Value => DecodedChunk::Values(sparse_values),
        });
        self.cache.insert(desc.offset, Rc::clone(&decoded));
        Ok(decoded)
    }
}
