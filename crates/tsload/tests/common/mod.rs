//! Shared fixtures: an in-memory file builder and collecting sinks.

#![allow(dead_code)]

use tsload::error::{LoadError, Result};
use tsload::tablet::{ColumnBuffer, Tablet};
use tsload::tsfile::format::{
    self, encode_sparse_values, encode_timestamps, encode_values, marker, ChunkGroupHeader,
    ChunkHeader, Page,
};
use tsload::tsfile::{Compression, DataType, Encoding, Timestamp, Value};
use tsload::TabletSink;
use std::fs;
use std::path::Path;

/// Builds syntactically valid data files byte by byte for tests.
pub struct TsFileBuilder {
    buf: Vec<u8>,
}

impl TsFileBuilder {
    pub fn new() -> Self {
        let mut buf = Vec::new();
        format::write_file_header(&mut buf).unwrap();
        Self { buf }
    }

    /// Opens a chunk group for a device.
    pub fn begin_device(&mut self, device: &str) -> &mut Self {
        self.buf.push(marker::CHUNK_GROUP_HEADER);
        ChunkGroupHeader::new(device).write_to(&mut self.buf).unwrap();
        self
    }

    /// Writes a single-page plain chunk.
    pub fn plain_chunk(
        &mut self,
        measurement: &str,
        data_type: DataType,
        points: &[(Timestamp, Value)],
    ) -> &mut Self {
        self.plain_chunk_pages(measurement, data_type, &[points.to_vec()])
    }

    /// Writes a plain chunk with one page per slice.
    pub fn plain_chunk_pages(
        &mut self,
        measurement: &str,
        data_type: DataType,
        pages: &[Vec<(Timestamp, Value)>],
    ) -> &mut Self {
        let encoded: Vec<Page> = pages
            .iter()
            .map(|points| {
                let timestamps: Vec<Timestamp> = points.iter().map(|(ts, _)| *ts).collect();
                let values: Vec<Value> = points.iter().map(|(_, v)| v.clone()).collect();
                Page::new(
                    points.len() as u32,
                    timestamps.first().copied().unwrap_or(0),
                    timestamps.last().copied().unwrap_or(0),
                    encode_timestamps(&timestamps),
                    encode_values(&values),
                )
            })
            .collect();
        let data_size: u32 = encoded.iter().map(Page::serialized_size).sum();
        let header_marker = if encoded.len() == 1 {
            marker::ONLY_ONE_PAGE_CHUNK_HEADER
        } else {
            marker::CHUNK_HEADER
        };
        self.buf.push(header_marker);
        ChunkHeader::new(
            measurement,
            data_type,
            Encoding::Plain,
            Compression::Uncompressed,
            data_size,
        )
        .write_to(&mut self.buf)
        .unwrap();
        for page in &encoded {
            page.write_to(&mut self.buf).unwrap();
        }
        self
    }

    /// Writes an aligned run: a shared time chunk plus one value chunk per
    /// column, each column holding one optional value per timestamp.
    pub fn aligned_chunk(
        &mut self,
        timestamps: &[Timestamp],
        columns: &[(&str, DataType, Vec<Option<Value>>)],
    ) -> &mut Self {
        let min_ts = timestamps.first().copied().unwrap_or(0);
        let max_ts = timestamps.last().copied().unwrap_or(0);

        let time_page = Page::new(
            timestamps.len() as u32,
            min_ts,
            max_ts,
            encode_timestamps(timestamps),
            Vec::new(),
        );
        self.buf.push(marker::ONLY_ONE_PAGE_TIME_CHUNK_HEADER);
        ChunkHeader::new(
            "",
            DataType::Vector,
            Encoding::Plain,
            Compression::Uncompressed,
            time_page.serialized_size(),
        )
        .write_to(&mut self.buf)
        .unwrap();
        time_page.write_to(&mut self.buf).unwrap();

        for (measurement, data_type, slots) in columns {
            assert_eq!(slots.len(), timestamps.len());
            let value_page = Page::new(
                timestamps.len() as u32,
                min_ts,
                max_ts,
                Vec::new(),
                encode_sparse_values(slots),
            );
            self.buf.push(marker::ONLY_ONE_PAGE_VALUE_CHUNK_HEADER);
            ChunkHeader::new(
                *measurement,
                *data_type,
                Encoding::Plain,
                Compression::Uncompressed,
                value_page.serialized_size(),
            )
            .write_to(&mut self.buf)
            .unwrap();
            value_page.write_to(&mut self.buf).unwrap();
        }
        self
    }

    /// Writes a single-page chunk declaring an arbitrary encoding and
    /// compression; the payload bytes stay plain regardless.
    pub fn chunk_with_codec(
        &mut self,
        measurement: &str,
        data_type: DataType,
        encoding: Encoding,
        compression: Compression,
        points: &[(Timestamp, Value)],
    ) -> &mut Self {
        let timestamps: Vec<Timestamp> = points.iter().map(|(ts, _)| *ts).collect();
        let values: Vec<Value> = points.iter().map(|(_, v)| v.clone()).collect();
        let page = Page::new(
            points.len() as u32,
            timestamps.first().copied().unwrap_or(0),
            timestamps.last().copied().unwrap_or(0),
            encode_timestamps(&timestamps),
            encode_values(&values),
        );
        self.buf.push(marker::ONLY_ONE_PAGE_CHUNK_HEADER);
        ChunkHeader::new(
            measurement,
            data_type,
            encoding,
            compression,
            page.serialized_size(),
        )
        .write_to(&mut self.buf)
        .unwrap();
        page.write_to(&mut self.buf).unwrap();
        self
    }

    /// Writes an operation index record.
    pub fn operation_index(&mut self, index: u64) -> &mut Self {
        self.buf.push(marker::OPERATION_INDEX_RANGE);
        self.buf.extend_from_slice(&index.to_le_bytes());
        self
    }

    /// Writes an arbitrary marker byte, for corruption tests.
    pub fn raw_marker(&mut self, m: u8) -> &mut Self {
        self.buf.push(m);
        self
    }

    /// Terminates the data section and writes the file.
    pub fn write(&mut self, path: &Path) {
        self.write_with_trailer(path, &[]);
    }

    /// Terminates the data section and writes the file with trailing index
    /// bytes after the separator.
    pub fn write_with_trailer(&mut self, path: &Path, trailer: &[u8]) {
        let mut bytes = self.buf.clone();
        bytes.push(marker::SEPARATOR);
        bytes.extend_from_slice(trailer);
        fs::write(path, bytes).unwrap();
    }
}

/// A tablet captured at flush time.
#[derive(Debug, Clone)]
pub struct FlushedTablet {
    pub tablet: Tablet,
    pub aligned: bool,
}

/// Sink that records every flushed tablet.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub tablets: Vec<FlushedTablet>,
}

impl CollectingSink {
    /// Tablets flushed for one device, in flush order.
    pub fn for_device(&self, device: &str) -> Vec<&FlushedTablet> {
        self.tablets
            .iter()
            .filter(|f| f.tablet.device() == device)
            .collect()
    }
}

impl TabletSink for CollectingSink {
    fn insert_tablet(&mut self, tablet: &Tablet) -> Result<()> {
        self.tablets.push(FlushedTablet {
            tablet: tablet.clone(),
            aligned: false,
        });
        Ok(())
    }

    fn insert_aligned_tablet(&mut self, tablet: &Tablet) -> Result<()> {
        self.tablets.push(FlushedTablet {
            tablet: tablet.clone(),
            aligned: true,
        });
        Ok(())
    }
}

/// Sink that rejects batches for one device and records the rest.
#[derive(Debug)]
pub struct RejectingSink {
    pub reject_device: String,
    pub inner: CollectingSink,
}

impl RejectingSink {
    pub fn new(reject_device: impl Into<String>) -> Self {
        Self {
            reject_device: reject_device.into(),
            inner: CollectingSink::default(),
        }
    }

    fn check(&self, tablet: &Tablet) -> Result<()> {
        if tablet.device() == self.reject_device {
            return Err(LoadError::DeliveryFailure(format!(
                "store rejected batch for {}",
                tablet.device()
            )));
        }
        Ok(())
    }
}

impl TabletSink for RejectingSink {
    fn insert_tablet(&mut self, tablet: &Tablet) -> Result<()> {
        self.check(tablet)?;
        self.inner.insert_tablet(tablet)
    }

    fn insert_aligned_tablet(&mut self, tablet: &Tablet) -> Result<()> {
        self.check(tablet)?;
        self.inner.insert_aligned_tablet(tablet)
    }
}

/// Sink whose connection is gone; every call is run-fatal.
#[derive(Debug, Default)]
pub struct DisconnectedSink;

impl TabletSink for DisconnectedSink {
    fn insert_tablet(&mut self, _tablet: &Tablet) -> Result<()> {
        Err(LoadError::ConnectionFailure("connection reset".to_string()))
    }

    fn insert_aligned_tablet(&mut self, _tablet: &Tablet) -> Result<()> {
        Err(LoadError::ConnectionFailure("connection reset".to_string()))
    }
}

/// Reads a buffered column value back out of a tablet.
pub fn value_at(buffer: &ColumnBuffer, row: usize) -> Value {
    match buffer {
        ColumnBuffer::Boolean(v) => Value::Boolean(v[row]),
        ColumnBuffer::Int32(v) => Value::Int32(v[row]),
        ColumnBuffer::Int64(v) => Value::Int64(v[row]),
        ColumnBuffer::Float(v) => Value::Float(v[row]),
        ColumnBuffer::Double(v) => Value::Double(v[row]),
        ColumnBuffer::Text(v) => Value::Text(v[row].clone()),
    }
}

/// Flattens a tablet back into `(timestamp, fields)` rows.
pub fn tablet_rows(tablet: &Tablet) -> Vec<(Timestamp, Vec<Option<Value>>)> {
    let columns = tablet.measurement_ids().len();
    tablet
        .timestamps()
        .iter()
        .enumerate()
        .map(|(row, &ts)| {
            let fields = (0..columns)
                .map(|col| {
                    if tablet.is_null(col, row) {
                        None
                    } else {
                        Some(value_at(tablet.column(col), row))
                    }
                })
                .collect();
            (ts, fields)
        })
        .collect()
}

/// Flattens every tablet flushed for a device, concatenated in flush order.
pub fn device_rows(sink: &CollectingSink, device: &str) -> Vec<(Timestamp, Vec<Option<Value>>)> {
    sink.for_device(device)
        .iter()
        .flat_map(|f| tablet_rows(&f.tablet))
        .collect()
}
