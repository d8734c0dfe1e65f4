//! Row reconstruction: per-series readers and the timestamp merge.

pub mod merge;
pub mod series;

pub use merge::{Row, RowMerger};
pub use series::{EmptySeriesReader, FileSeriesReader, SeriesReader};
