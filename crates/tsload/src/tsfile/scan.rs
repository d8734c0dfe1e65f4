//! Structural pass over a file: marker-driven schema discovery.
//!
//! This pass walks the marker stream once, recording which measurements each
//! device declares, and skips every chunk payload via its declared data size.
//! It never touches page bytes; the metadata pass in
//! [`crate::tsfile::metadata`] re-scans lazily for the chunks a path needs.

use crate::error::{LoadError, Result};
use crate::tsfile::format::{self, marker, ChunkGroupHeader, ChunkHeader, ChunkRole};
use crate::tsfile::MeasurementSchema;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Device to measurement-schema index built by the structural pass.
///
/// Aligned devices contribute one [`crate::tsfile::DataType::Vector`]
/// sentinel schema (from their shared time chunk) plus their real value
/// column schemas. Set semantics deduplicate schemas repeated across chunk
/// groups.
pub type DeviceIndex = BTreeMap<String, BTreeSet<MeasurementSchema>>;

/// Scans a file's marker stream and returns its device index.
///
/// # Errors
///
/// Returns [`LoadError::UnexpectedMarker`] on a corrupt or unsupported
/// marker, and magic/version errors from the file header.
pub fn scan_device_schemas(path: &Path) -> Result<DeviceIndex> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    format::read_file_header(&mut reader)?;

    let mut index = DeviceIndex::new();
    let mut current_device: Option<String> = None;

    loop {
        let marker_offset = reader.stream_position()?;
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let m = byte[0];

        if m == marker::SEPARATOR {
            break;
        }

        if let Some(_role) = ChunkRole::from_marker(m) {
            let header = ChunkHeader::read_from(&mut reader)?;
            let device = current_device.as_ref().ok_or_else(|| {
                LoadError::DecodeError(format!(
                    "Chunk header at offset {} precedes any chunk group header",
                    marker_offset
                ))
            })?;
            index.entry(device.clone()).or_default().insert(
                MeasurementSchema::new(
                    header.measurement_id,
                    header.data_type,
                    header.encoding,
                    header.compression,
                ),
            );
            // Payload is not decoded in this pass.
            reader.seek(SeekFrom::Current(header.data_size as i64))?;
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

    Ok(index)
}
