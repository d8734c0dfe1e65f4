//! Per-series point readers over reconciled chunk metadata.
//!
//! A series reader yields `(timestamp, value)` pairs in timestamp order,
//! decoding one chunk at a time through the shared [`ChunkLoader`] so a
//! large series is never materialized wholesale. Reconciled deletion ranges
//! are applied here, point by point, which keeps the loader's cache free of
//! any per-path view.

use crate::error::{LoadError, Result};
use crate::tsfile::metadata::{ChunkLoader, ChunkMetadata, DecodedChunk};
use crate::tsfile::{Timestamp, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A stream of `(timestamp, value)` points for one series, ordered by
/// timestamp.
pub trait SeriesReader {
    /// Returns the next surviving point, or `None` when the series is
    /// exhausted.
    fn next_point(&mut self) -> Result<Option<(Timestamp, Value)>>;
}

/// Reader over a non-empty chunk metadata list, plain or aligned.
pub struct FileSeriesReader {
    loader: Rc<RefCell<ChunkLoader>>,
    chunks: VecDeque<ChunkMetadata>,
    buffer: VecDeque<(Timestamp, Value)>,
}

impl FileSeriesReader {
    /// Creates a reader over the given (already reconciled) chunk metadata.
    pub fn new(loader: Rc<RefCell<ChunkLoader>>, chunks: Vec<ChunkMetadata>) -> Self {
        Self {
            loader,
            chunks: chunks.into(),
            buffer: VecDeque::new(),
        }
    }

    /// Decodes chunks until the buffer holds points or the list runs out.
    fn fill_buffer(&mut self) -> Result<()> {
        while self.buffer.is_empty() {
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(());
            };
            match chunk {
                ChunkMetadata::Plain(desc) => {
                    let decoded = self.loader.borrow_mut().load(&desc)?;
                    let DecodedChunk::Plain { timestamps, values } = decoded.as_ref() else {
                        return Err(LoadError::DecodeError(format!(
                            "Chunk at offset {} decoded with the wrong shape",
                            desc.offset
                        )));
                    };
                    for (&ts, value) in timestamps.iter().zip(values) {
                        if !desc.is_deleted_at(ts) {
                            self.buffer.push_back((ts, value.clone()));
                        }
                    }
                }
                ChunkMetadata::Aligned { time, values } => {
                    let value_desc = values.into_iter().next().ok_or_else(|| {
                        LoadError::DecodeError(
                            "Aligned chunk metadata carries no value column".to_string(),
                        )
                    })?;
                    let time_decoded = self.loader.borrow_mut().load(&time)?;
                    let DecodedChunk::Time(timestamps) = time_decoded.as_ref() else {
                        return Err(LoadError::DecodeError(format!(
                            "Time chunk at offset {} decoded with the wrong shape",
                            time.offset
                        )));
                    };
                    let value_decoded = self.loader.borrow_mut().load(&value_desc)?;
                    let DecodedChunk::Values(slots) = value_decoded.as_ref() else {
                        return Err(LoadError::DecodeError(format!(
                            "Value chunk at offset {} decoded with the wrong shape",
                            value_desc.offset
                        )));
                    };
                    if timestamps.len() != slots.len() {
                        return Err(LoadError::DecodeError(format!(
                            "Aligned run at offset {} has {} time slots but {} value slots",
                            time.offset,
                            timestamps.len(),
                            slots.len()
                        )));
                    }
                    for (&ts, slot) in timestamps.iter().zip(slots) {
                        if let Some(value) = slot {
                            if !value_desc.is_deleted_at(ts) {
                                self.buffer.push_back((ts, value.clone()));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl SeriesReader for FileSeriesReader {
    fn next_point(&mut self) -> Result<Option<(Timestamp, Value)>> {
        if self.buffer.is_empty() {
            self.fill_buffer()?;
        }
        Ok(self.buffer.pop_front())
    }
}

/// Reader for a series with no surviving chunk data in this file.
///
/// The series still advertises its declared data type in the output schema;
/// it just produces no rows.
#[derive(Debug, Default)]
pub struct EmptySeriesReader;

impl SeriesReader for EmptySeriesReader {
    fn next_point(&mut self) -> Result<Option<(Timestamp, Value)>> {
        Ok(None)
    }
}
