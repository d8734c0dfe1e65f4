//! Sidecar modification (deletion) log and chunk-metadata reconciliation.
//!
//! Every data file may carry a `<name>.mods` sidecar of deletion records,
//! one per line:
//!
//! ```text
//! DELETION,root.sg.d1.s1,100,200
//! ```
//!
//! marking the inclusive time range `[100, 200]` of `root.sg.d1.s1` as
//! logically removed. Deletions are applied to chunk metadata before any row
//! reconstruction: fully covered chunks are dropped, partially covered ones
//! keep an interval list the chunk readers consult point by point.

use crate::error::{LoadError, Result};
use crate::tsfile::metadata::{ChunkDescriptor, ChunkMetadata};
use crate::tsfile::{SeriesPath, TimeRange};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to a data file's name to locate its sidecar log.
pub const MODS_SUFFIX: &str = ".mods";

/// A single deletion record from the sidecar log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    /// The series the deletion targets.
    pub path: SeriesPath,
    /// The removed time range (inclusive).
    pub range: TimeRange,
}

/// Returns the sidecar log path for a data file.
pub fn modification_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(MODS_SUFFIX);
    PathBuf::from(name)
}

/// Loads the deletion log for a data file, returning an empty list when no
/// sidecar exists (the cheap common case).
///
/// # Errors
///
/// Returns [`LoadError::InvalidPath`] for an unparsable series path and
/// [`LoadError::DecodeError`] for any other malformed record; both fail the
/// owning file's processing.
pub fn load_modifications(file: &Path) -> Result<Vec<Deletion>> {
    let sidecar = modification_path(file);
    if !sidecar.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&sidecar)?;
    let mut deletions = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        deletions.push(parse_record(line).map_err(|e| match e {
            LoadError::InvalidPath(p) => LoadError::InvalidPath(p),
            other => LoadError::DecodeError(format!(
                "{}: line {}: {}",
                sidecar.display(),
                lineno + 1,
                other
            )),
        })?);
    }
    Ok(deletions)
}

fn parse_record(line: &str) -> Result<Deletion> {
    let mut parts = line.split(',');
    let kind = parts.next().unwrap_or_default();
    if kind != "DELETION" {
        return Err(LoadError::DecodeError(format!(
            "Unknown modification kind {:?}",
            kind
        )));
    }
    let path = parts
        .next()
        .ok_or_else(|| LoadError::DecodeError("Missing path field".to_string()))?;
    let start = parse_ts(parts.next(), "start")?;
    let end = parse_ts(parts.next(), "end")?;
    if parts.next().is_some() {
        return Err(LoadError::DecodeError("Trailing fields".to_string()));
    }
    if start > end {
        return Err(LoadError::DecodeError(format!(
            "Inverted range [{}, {}]",
            start, end
        )));
    }
    Ok(Deletion {
        path: SeriesPath::parse(path)?,
        range: TimeRange::new(start, end),
    })
}

fn parse_ts(field: Option<&str>, what: &str) -> Result<i64> {
    field
        .ok_or_else(|| LoadError::DecodeError(format!("Missing {} timestamp", what)))?
        .parse::<i64>()
        .map_err(|e| LoadError::DecodeError(format!("Bad {} timestamp: {}", what, e)))
}

/// Applies the deletions matching `path` to a series' chunk metadata list.
///
/// Non-aligned entries take the deletions directly; aligned entries take
/// them only on the value column carried for this path, never on the shared
/// time chunk. Entries left without any live data are removed.
pub fn modify_chunk_metadata(
    chunks: &mut Vec<ChunkMetadata>,
    deletions: &[Deletion],
    path: &SeriesPath,
) {
    if deletions.is_empty() {
        return;
    }
    let matched: Vec<TimeRange> = deletions
        .iter()
        .filter(|d| d.path == *path)
        .map(|d| d.range)
        .collect();
    if matched.is_empty() {
        return;
    }

    chunks.retain_mut(|chunk| match chunk {
        ChunkMetadata::Plain(desc) => apply_to_descriptor(desc, &matched),
        ChunkMetadata::Aligned { values, .. } => {
            values.retain_mut(|value| {
                if value.measurement_id == path.measurement {
                    apply_to_descriptor(value, &matched)
                } else {
                    true
                }
            });
            !values.is_empty()
        }
    });
}

/// Records the overlapping deletion ranges on a descriptor. Returns false
/// when the chunk is fully covered and should be dropped outright.
fn apply_to_descriptor(desc: &mut ChunkDescriptor, ranges: &[TimeRange]) -> bool {
    for range in ranges {
        if range.covers(&desc.time_range) {
            return false;
        }
        if range.overlaps(&desc.time_range) {
            desc.deleted.push(*range);
        }
    }
    true
}
