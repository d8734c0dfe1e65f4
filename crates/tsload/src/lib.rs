//! tsload - bulk loader for immutable columnar time-series files.
//!
//! This crate converts historical data files into bounded-size write batches
//! for a live time-series store. It is a one-shot, file-to-batch converter:
//! files are discovered and ordered, decoded marker by marker without a
//! prebuilt index, reconciled against sidecar deletion logs, reconstructed
//! into row streams and repackaged into tablets.
//!
//! # Components
//!
//! - [`loader::TsFileLoader`]: orchestrates the pipeline per file
//! - [`tsfile::scan`]: marker-driven schema discovery
//! - [`tsfile::metadata`]: chunk metadata pass and cached chunk loading
//! - [`mods`]: deletion log reconciliation
//! - [`read`]: per-series readers and the timestamp merge
//! - [`tablet::Tablet`]: fixed-capacity write batches
//! - [`session::TabletSink`]: the delivery seam towards the store
//!
//! # Example
//!
//! ```rust,ignore
//! use tsload::loader::{LoaderConfig, TsFileLoader};
//!
//! let mut loader = TsFileLoader::with_config(session, LoaderConfig::default());
//! let summary = loader.load(std::path::Path::new("/data/sequence"))?;
//! println!("{} loaded, {} failed", summary.loaded, summary.failed.len());
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod loader;
pub mod mods;
pub mod read;
pub mod session;
pub mod tablet;
pub mod tsfile;

pub use error::{LoadError, Result};
pub use loader::{LoadSummary, LoaderConfig, TsFileLoader};
pub use session::TabletSink;
pub use tablet::Tablet;
