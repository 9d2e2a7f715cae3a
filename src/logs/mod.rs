//! Pipeline log files: discovery, selection, and content parsing.
//!
//! Every pipeline stage writes one text log per run, named
//! `{subtask}_{unix_ts}.txt`. This module knows how to find those files in a
//! site directory, pick the newest one, and pull runtime / status / excerpt
//! information out of the free-text content.

pub mod parser;
pub mod select;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use parser::{LogContent, LogStatus};
pub use select::most_recent;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to read log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log file name {name:?} does not end in _<unix timestamp>.<ext>")]
    BadFilenameTimestamp { name: String },

    #[error("timestamp {secs} in {name:?} is out of range")]
    TimestampOutOfRange { name: String, secs: i64 },

    #[error("malformed time marker in {path}: {line:?}")]
    BadTimeMarker { path: PathBuf, line: String },

    #[error("no candidate log files to choose from")]
    NoCandidates,
}

/// List every `{subtask}_*.txt` file directly inside `dir`.
///
/// The returned list is unsorted; use [`most_recent`] to pick one.
pub fn find_subtask_logs(dir: &Path, subtask: &str) -> Result<Vec<PathBuf>, LogError> {
    let prefix = format!("{subtask}_");
    let entries = std::fs::read_dir(dir).map_err(|source| LogError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LogError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        // Hidden files are not matched, same as a shell glob.
        if name.starts_with('.') || !name.starts_with(&prefix) || !name.ends_with(".txt") {
            continue;
        }
        if entry.path().is_file() {
            found.push(entry.path());
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_subtask_logs_matches_prefix_and_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in [
            "audio_process_1700000000.txt",
            "audio_process_1700000100.txt",
            "audio_process_1700000200.log",
            "video_process_1700000000.txt",
            ".audio_process_1700000300.txt",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("audio_process_dir.txt")).unwrap();

        let mut found = find_subtask_logs(dir.path(), "audio_process").unwrap();
        found.sort();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["audio_process_1700000000.txt", "audio_process_1700000100.txt"]
        );
    }

    #[test]
    fn test_find_subtask_logs_missing_dir_errors() {
        let result = find_subtask_logs(Path::new("/nonexistent/site"), "audio_process");
        assert!(matches!(result, Err(LogError::Read { .. })));
    }
}
