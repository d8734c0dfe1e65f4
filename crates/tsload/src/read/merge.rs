//! K-way timestamp merge across per-measurement series readers.
//!
//! Emits one row per distinct timestamp in the union of all column streams,
//! with absent columns marked null. Timestamps are strictly increasing
//! within one device's stream; the merge never materializes more than one
//! buffered point per column.

use crate::error::Result;
use crate::read::series::SeriesReader;
use crate::tsfile::{Timestamp, Value};

/// One reconstructed row: a timestamp and one optional value per selected
/// measurement column, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Row timestamp.
    pub timestamp: Timestamp,
    /// One slot per column; `None` marks an explicit null.
    pub fields: Vec<Option<Value>>,
}

/// Merges N series readers into a single row stream ordered by timestamp.
///
/// Each input stream must itself be strictly increasing in timestamp; a
/// stream that repeats a timestamp yields one row per repeat rather than
/// collapsing them.
pub struct RowMerger {
    readers: Vec<Box<dyn SeriesReader>>,
    heads: Vec<Option<(Timestamp, Value)>>,
}

impl RowMerger {
    /// Creates a merger over one reader per selected column, priming each
    /// column's head point.
    pub fn new(mut readers: Vec<Box<dyn SeriesReader>>) -> Result<Self> {
        let mut heads = Vec::with_capacity(readers.len());
        for reader in &mut readers {
            heads.push(reader.next_point()?);
        }
        Ok(Self { readers, heads })
    }

    /// Number of columns in the merged stream.
    pub fn column_count(&self) -> usize {
        self.readers.len()
    }

    /// Returns the next merged row, or `None` when every column is
    /// exhausted.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(timestamp) = self
            .heads
            .iter()
            .filter_map(|head| head.as_ref().map(|(ts, _)| *ts))
            .min()
        else {
            return Ok(None);
        };

        let mut fields = Vec::with_capacity(self.heads.len());
        for (head, reader) in self.heads.iter_mut().zip(&mut self.readers) {
            match head.take() {
                Some((ts, value)) if ts == timestamp => {
                    *head = reader.next_point()?;
                    fields.push(Some(value));
                }
                other => {
                    *head = other;
                    fields.push(None);
                }
            }
        }

        Ok(Some(Row { timestamp, fields }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsfile::Value;

    /// In-memory reader used to exercise the merge without file fixtures.
    struct VecReader(std::vec::IntoIter<(Timestamp, Value)>);

    impl VecReader {
        fn new(points: Vec<(Timestamp, Value)>) -> Box<dyn SeriesReader> {
            Box::new(Self(points.into_iter()))
        }
    }

    impl SeriesReader for VecReader {
        fn next_point(&mut self) -> Result<Option<(Timestamp, Value)>> {
            Ok(self.0.next())
        }
    }

    fn collect_rows(mut merger: RowMerger) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(row) = merger.next_row().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_union_with_nulls() {
        let merger = RowMerger::new(vec![
            VecReader::new(vec![(1, Value::Int32(10)), (5, Value::Int32(50))]),
            VecReader::new(vec![(1, Value::Int32(-1)), (3, Value::Int32(-3))]),
        ])
        .unwrap();

        let rows = collect_rows(merger);
        assert_eq!(
            rows,
            vec![
                Row {
                    timestamp: 1,
                    fields: vec![Some(Value::Int32(10)), Some(Value::Int32(-1))],
                },
                Row {
                    timestamp: 3,
                    fields: vec![None, Some(Value::Int32(-3))],
                },
                Row {
                    timestamp: 5,
                    fields: vec![Some(Value::Int32(50)), None],
                },
            ]
        );
    }

    #[test]
    fn test_strictly_increasing_timestamps() {
        let merger = RowMerger::new(vec![
            VecReader::new((0..100).map(|i| (i * 2, Value::Int64(i))).collect()),
            VecReader::new((0..100).map(|i| (i * 3, Value::Int64(i))).collect()),
        ])
        .unwrap();

        let rows = collect_rows(merger);
        for pair in rows.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_repeated_timestamp_within_one_stream_repeats_rows() {
        let merger = RowMerger::new(vec![VecReader::new(vec![
            (1, Value::Int32(10)),
            (1, Value::Int32(20)),
        ])])
        .unwrap();

        let rows = collect_rows(merger);
        assert_eq!(
            rows,
            vec![
                Row {
                    timestamp: 1,
                    fields: vec![Some(Value::Int32(10))],
                },
                Row {
                    timestamp: 1,
                    fields: vec![Some(Value::Int32(20))],
                },
            ]
        );
    }

    #[test]
    fn test_all_empty_columns() {
        let merger = RowMerger::new(vec![
            VecReader::new(Vec::new()),
            VecReader::new(Vec::new()),
        ])
        .unwrap();
        assert!(collect_rows(merger).is_empty());
    }
}
