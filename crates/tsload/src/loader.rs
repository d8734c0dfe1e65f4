//! File discovery, ordering and the load orchestrator.
//!
//! The orchestrator drives the full pipeline per file: structural scan,
//! deletion reconciliation, metadata query, row reconstruction and tablet
//! dispatch. A failure in one file is recorded and the run moves on; only a
//! connection failure aborts the whole load.

use crate::error::{LoadError, Result};
use crate::mods;
use crate::read::{EmptySeriesReader, FileSeriesReader, RowMerger, SeriesReader};
use crate::session::TabletSink;
use crate::tablet::{Tablet, DEFAULT_TABLET_CAPACITY};
use crate::tsfile::metadata::{ChunkLoader, MetadataQuerier};
use crate::tsfile::scan::scan_device_schemas;
use crate::tsfile::{DataType, SeriesPath};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{info, warn};

/// Extension of loadable data files.
pub const TSFILE_SUFFIX: &str = ".tsfile";

/// Configuration for a load run.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Tablet capacity in rows.
    pub tablet_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            tablet_capacity: DEFAULT_TABLET_CAPACITY,
        }
    }
}

impl LoaderConfig {
    /// Sets the tablet capacity.
    pub fn with_tablet_capacity(mut self, capacity: usize) -> Self {
        self.tablet_capacity = capacity;
        self
    }
}

/// Outcome of a load run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    /// Number of files loaded successfully.
    pub loaded: usize,
    /// Files that failed, in discovery order.
    pub failed: Vec<PathBuf>,
}

impl LoadSummary {
    /// Total number of files the run attempted.
    pub fn total(&self) -> usize {
        self.loaded + self.failed.len()
    }
}

/// Recursively collects files with the expected extension under `root`.
///
/// A file root yields itself (if it matches), a directory is traversed
/// depth-first, and empty directories contribute nothing.
pub fn collect_tsfiles(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_into(root, &mut files)?;
    Ok(files)
}

fn collect_into(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_file() {
        if matches_suffix(path) {
            out.push(path.to_path_buf());
        }
        return Ok(());
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let child = entry.path();
        if child.is_dir() {
            collect_into(&child, out)?;
        } else if matches_suffix(&child) {
            out.push(child);
        }
    }
    Ok(())
}

fn matches_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TSFILE_SUFFIX))
}

/// Sorts files ascending by the `(timestamp, version)` pair embedded in
/// their names, ties broken by version.
///
/// # Errors
///
/// Returns [`LoadError::MalformedFileName`] if any name lacks two leading
/// numeric `_`-separated tokens; a file must never be silently assigned a
/// default order.
pub fn sort_tsfiles(files: &mut [PathBuf]) -> Result<()> {
    let mut keyed: Vec<((i64, i64), PathBuf)> = Vec::with_capacity(files.len());
    for file in files.iter() {
        keyed.push((file_order_key(file)?, file.clone()));
    }
    keyed.sort_by_key(|(key, _)| *key);
    for (slot, (_, file)) in files.iter_mut().zip(keyed) {
        *slot = file;
    }
    Ok(())
}

/// Parses the `(timestamp, version)` order key from a file name.
pub fn file_order_key(file: &Path) -> Result<(i64, i64)> {
    let malformed = || LoadError::MalformedFileName {
        path: file.to_path_buf(),
    };
    let name = file.file_name().and_then(|n| n.to_str()).ok_or_else(malformed)?;
    let mut tokens = name.split('_');
    let timestamp = tokens
        .next()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or_else(malformed)?;
    let version = tokens
        .next()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or_else(malformed)?;
    Ok((timestamp, version))
}

/// One-shot bulk loader: converts discovered files into tablet batches and
/// dispatches them to a [`TabletSink`].
pub struct TsFileLoader<S: TabletSink> {
    sink: S,
    config: LoaderConfig,
}

impl<S: TabletSink> TsFileLoader<S> {
    /// Creates a loader with the default configuration.
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, LoaderConfig::default())
    }

    /// Creates a loader with an explicit configuration.
    pub fn with_config(sink: S, config: LoaderConfig) -> Self {
        Self { sink, config }
    }

    /// Consumes the loader, returning the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs a full load over a file or directory root.
    ///
    /// Per-file errors are recorded in the summary and do not stop the run.
    ///
    /// # Errors
    ///
    /// Returns discovery errors, [`LoadError::MalformedFileName`] from
    /// ordering, and [`LoadError::ConnectionFailure`] from the sink; all of
    /// these abort the run.
    pub fn load(&mut self, root: &Path) -> Result<LoadSummary> {
        let mut files = collect_tsfiles(root)?;
        sort_tsfiles(&mut files)?;
        let total = files.len();
        info!("Collected {} files to be loaded from {:?}", total, root);

        let mut summary = LoadSummary::default();
        for (i, file) in files.iter().enumerate() {
            info!("Loading {:?} ({}/{})", file, i + 1, total);
            match self.load_file(file) {
                Ok(()) => summary.loaded += 1,
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    warn!("Failed to load {:?}: {}", file, err);
                    summary.failed.push(file.clone());
                }
            }
        }

        info!(
            "Finished loading: {} succeeded, {} failed",
            summary.loaded,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Loads one file: scan, reconcile, reconstruct, batch, dispatch.
    fn load_file(&mut self, file: &Path) -> Result<()> {
        let deletions = mods::load_modifications(file)?;
        let device_index = scan_device_schemas(file)?;
        let querier = MetadataQuerier::build(file)?;
        // Cache scope is exactly this file's processing.
        let loader = Rc::new(RefCell::new(ChunkLoader::open(file)?));

        for (device, schemas) in &device_index {
            // The Vector sentinel flags the aligned layout; it is not a
            // data column and never reaches the tablet.
            let mut is_aligned = false;
            let mut measurement_schemas = Vec::new();
            for schema in schemas {
                if schema.data_type == DataType::Vector {
                    is_aligned = true;
                } else {
                    measurement_schemas.push(schema);
                }
            }
            if measurement_schemas.is_empty() {
                continue;
            }

            let mut readers: Vec<Box<dyn SeriesReader>> = Vec::new();
            let mut columns = Vec::new();
            for schema in &measurement_schemas {
                let path = SeriesPath::new(device.clone(), schema.measurement_id.clone());
                let mut chunk_list = querier.chunk_metadata(&path);
                mods::modify_chunk_metadata(&mut chunk_list, &deletions, &path);

                // Data exists: trust its metadata; otherwise fall back to
                // the declared schema.
                let data_type = match chunk_list.first() {
                    Some(chunk) => chunk.data_type(),
                    None => querier.declared_data_type(&path).unwrap_or(schema.data_type),
                };
                columns.push((schema.measurement_id.clone(), data_type));
                if chunk_list.is_empty() {
                    readers.push(Box::new(EmptySeriesReader));
                } else {
                    readers.push(Box::new(FileSeriesReader::new(
                        Rc::clone(&loader),
                        chunk_list,
                    )));
                }
            }

            let mut merger = RowMerger::new(readers)?;
            let mut tablet = Tablet::new(device.clone(), &columns, self.config.tablet_capacity)?;
            while let Some(row) = merger.next_row()? {
                tablet.add_row(row.timestamp, &row.fields)?;
                if tablet.is_full() {
                    self.dispatch(&tablet, is_aligned)?;
                    tablet.reset();
                }
            }
            if tablet.row_size() > 0 {
                self.dispatch(&tablet, is_aligned)?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, tablet: &Tablet, is_aligned: bool) -> Result<()> {
        if is_aligned {
            self.sink.insert_aligned_tablet(tablet)
        } else {
            self.sink.insert_tablet(tablet)
        }
    }
}
