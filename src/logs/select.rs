//! Picking the newest log among many runs of the same subtask.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::LogError;

/// Return the candidate whose full path sorts last, byte by byte.
///
/// The naming convention writes fixed-width epoch seconds, which makes the
/// lexicographic maximum the most recent run. When the timestamp widths are
/// mixed that no longer holds; a warning is logged but the selection rule is
/// left unchanged.
pub fn most_recent(candidates: &[PathBuf]) -> Result<PathBuf, LogError> {
    let newest = candidates
        .iter()
        .max_by(|a, b| a.as_os_str().cmp(b.as_os_str()))
        .ok_or(LogError::NoCandidates)?;

    let widths = timestamp_widths(candidates);
    if widths.len() > 1 {
        warn!(
            selected = %newest.display(),
            ?widths,
            "log timestamps have mixed widths; name order may not match run order"
        );
    }

    Ok(newest.clone())
}

/// Distinct lengths of the timestamp segments among `candidates`.
fn timestamp_widths(candidates: &[PathBuf]) -> BTreeSet<usize> {
    candidates
        .iter()
        .filter_map(|p| timestamp_segment(p))
        .map(str::len)
        .collect()
}

/// `1703230348` out of `.../audio_process_1703230348.txt`.
fn timestamp_segment(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.rsplit('_').next()?.split('.').next()
}
