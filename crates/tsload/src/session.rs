//! Delivery seam towards the target store.
//!
//! The network session is an external collaborator; the pipeline only needs
//! the two insert operations. Implementations map transport problems onto
//! [`crate::error::LoadError::DeliveryFailure`] (fails the current file) or
//! [`crate::error::LoadError::ConnectionFailure`] (aborts the run).
//! Re-sending a tablet after a partial failure is expected to be safe; the
//! store deduplicates by timestamp.

use crate::error::Result;
use crate::tablet::Tablet;

/// Destination for flushed tablets.
pub trait TabletSink {
    /// Delivers a non-aligned tablet.
    fn insert_tablet(&mut self, tablet: &Tablet) -> Result<()>;

    /// Delivers an aligned tablet; the store treats the shared time column
    /// as canonical for every value column in the batch.
    fn insert_aligned_tablet(&mut self, tablet: &Tablet) -> Result<()>;
}
