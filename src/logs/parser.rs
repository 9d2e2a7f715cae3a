//! Free-text log parsing: run time, status classification, note excerpt.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use serde::Serialize;

use super::LogError;

/// Substring that marks a wall-clock progress line, e.g. `Current time: 18:03:49`.
pub const TIME_MARKER: &str = "Current time";

/// Format of the time token on a [`TIME_MARKER`] line.
const MARKER_TIME_FORMAT: &str = "%H:%M:%S";

/// Start of a traceback block.
const TRACEBACK_MARKER: &str = "Traceback";

/// Maximum number of lines kept in the note attached to the status cell.
pub const EXCERPT_LINES: usize = 20;

/// Coarse outcome of a pipeline run, derived from its log text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// The log file has no lines at all.
    EmptyLog,
    /// An `ERROR:` line or a traceback was printed.
    UncaughtException,
    /// The pipeline refused the job and asked to be requeued.
    PipelineRejected,
    NoErrors,
}

impl LogStatus {
    /// Text written to the status cell.
    pub fn label(&self) -> &'static str {
        match self {
            LogStatus::EmptyLog => "Empty log file",
            LogStatus::UncaughtException => "Uncaught Exception",
            LogStatus::PipelineRejected => "Pipeline Rejected",
            LogStatus::NoErrors => "No errors",
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, LogStatus::NoErrors)
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered classification rules. The first rule with a matching line wins,
/// so exception markers always outrank rejection markers.
const STATUS_RULES: &[(&[&str], LogStatus)] = &[
    (&["ERROR:", "Traceback"], LogStatus::UncaughtException),
    (&["Exiting, please requeue"], LogStatus::PipelineRejected),
];

/// Lines of one log file, read fully into memory.
#[derive(Debug, Clone)]
pub struct LogContent {
    path: PathBuf,
    lines: Vec<String>,
}

impl LogContent {
    /// Read the log at `path`. Invalid UTF-8 is replaced rather than rejected.
    pub fn read(path: &Path) -> Result<Self, LogError> {
        let bytes = std::fs::read(path).map_err(|source| LogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(path, &String::from_utf8_lossy(&bytes)))
    }

    pub fn from_text(path: &Path, text: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Elapsed time between the first and the last `Current time` marker.
    ///
    /// No markers yields a zero duration. When the last marker is earlier in
    /// the day than the first, the run crossed midnight and a day is added.
    pub fn runtime(&self) -> Result<TimeDelta, LogError> {
        let mut markers = self.lines.iter().filter(|l| l.contains(TIME_MARKER));
        let Some(first) = markers.next() else {
            return Ok(TimeDelta::zero());
        };
        let last = markers.last().unwrap_or(first);

        let start = self.marker_time(first)?;
        let end = self.marker_time(last)?;

        let mut runtime = end.signed_duration_since(start);
        if runtime < TimeDelta::zero() {
            runtime = runtime + TimeDelta::days(1);
        }
        Ok(runtime)
    }

    fn marker_time(&self, line: &str) -> Result<NaiveTime, LogError> {
        line.split_whitespace()
            .nth(2)
            .and_then(|token| NaiveTime::parse_from_str(token, MARKER_TIME_FORMAT).ok())
            .ok_or_else(|| LogError::BadTimeMarker {
                path: self.path.clone(),
                line: line.to_string(),
            })
    }

    /// Classify the run. An empty log short-circuits before any rule is tried.
    pub fn status(&self) -> LogStatus {
        if self.is_empty() {
            return LogStatus::EmptyLog;
        }
        STATUS_RULES
            .iter()
            .find(|(patterns, _)| self.lines.iter().any(|l| matches_any(l, patterns)))
            .map(|(_, status)| *status)
            .unwrap_or(LogStatus::NoErrors)
    }

    /// Short excerpt for the spreadsheet note.
    ///
    /// For an error status this is the lines that triggered it, and for a
    /// traceback the whole block from the last `Traceback` line to the end of
    /// the log. Otherwise the tail of the log. At most [`EXCERPT_LINES`] lines
    /// either way, keeping the last ones.
    pub fn excerpt(&self) -> String {
        let status = self.status();
        let rule = STATUS_RULES.iter().find(|(_, s)| *s == status);

        let picked: Vec<&str> = match rule {
            Some((patterns, _)) => {
                let block_start = self
                    .lines
                    .iter()
                    .rposition(|l| l.contains(TRACEBACK_MARKER))
                    .unwrap_or(self.lines.len());
                let (before, block) = self.lines.split_at(block_start);
                before
                    .iter()
                    .filter(|l| matches_any(l, patterns))
                    .chain(block)
                    .map(String::as_str)
                    .collect()
            }
            None => self.lines.iter().map(String::as_str).collect(),
        };

        let skip = picked.len().saturating_sub(EXCERPT_LINES);
        picked[skip..].join("\n")
    }
}

fn matches_any(line: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| line.contains(p))
}

/// Run time encoded in a log file name: `anything_<unix seconds>.ext`,
/// converted to local time.
pub fn datetime_from_filename(path: &Path) -> Result<DateTime<Local>, LogError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let segment = name
        .rsplit('_')
        .next()
        .and_then(|tail| tail.split('.').next())
        .unwrap_or_default();

    let secs: i64 = segment
        .trim()
        .parse()
        .map_err(|_| LogError::BadFilenameTimestamp {
            name: name.to_string(),
        })?;

    DateTime::from_timestamp(secs, 0)
        .map(|utc| utc.with_timezone(&Local))
        .ok_or_else(|| LogError::TimestampOutOfRange {
            name: name.to_string(),
            secs,
        })
}

/// Render a duration the way the monitoring sheet has always shown it:
/// `H:MM:SS`, prefixed with `N day(s), ` past 24 hours.
pub fn format_runtime(runtime: TimeDelta) -> String {
    let total = runtime.num_seconds();
    let days = total.div_euclid(86_400);
    let rem = total.rem_euclid(86_400);
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);

    match days {
        0 => clock,
        1 | -1 => format!("{days} day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> LogContent {
        LogContent::from_text(Path::new("audio_process_1700000000.txt"), text)
    }

    #[test]
    fn test_runtime_between_first_and_last_marker() {
        let log = content(
            "starting\nCurrent time: 10:00:00\nworking\nCurrent time: 10:45:00\nCurrent time: 11:30:00\ndone\n",
        );
        let runtime = log.runtime().unwrap();
        assert_eq!(runtime, TimeDelta::minutes(90));
        assert_eq!(format_runtime(runtime), "1:30:00");
    }

    #[test]
    fn test_runtime_without_markers_is_zero() {
        let log = content("nothing to see\nstill nothing\n");
        let runtime = log.runtime().unwrap();
        assert_eq!(runtime, TimeDelta::zero());
        assert_eq!(format_runtime(runtime), "0:00:00");
    }

    #[test]
    fn test_runtime_single_marker_is_zero() {
        let log = content("Current time: 08:15:00\n");
        assert_eq!(log.runtime().unwrap(), TimeDelta::zero());
    }

    #[test]
    fn test_runtime_wraps_past_midnight() {
        let log = content("Current time: 23:00:00\nCurrent time: 01:00:00\n");
        assert_eq!(log.runtime().unwrap(), TimeDelta::hours(2));
    }

    #[test]
    fn test_runtime_malformed_marker_errors() {
        let log = content("Current time: soon\nCurrent time: 11:00:00\n");
        assert!(matches!(log.runtime(), Err(LogError::BadTimeMarker { .. })));

        let truncated = content("Current time\n");
        assert!(truncated.runtime().is_err());
    }

    #[test]
    fn test_status_exception_outranks_rejection() {
        let log = content("ERROR: disk full\nExiting, please requeue\n");
        assert_eq!(log.status(), LogStatus::UncaughtException);

        let tb = content("Exiting, please requeue\nTraceback (most recent call last):\n");
        assert_eq!(tb.status(), LogStatus::UncaughtException);
    }

    #[test]
    fn test_status_rejection_and_clean() {
        assert_eq!(
            content("Exiting, please requeue\n").status(),
            LogStatus::PipelineRejected
        );
        assert_eq!(content("all good\n").status(), LogStatus::NoErrors);
        assert_eq!(LogStatus::NoErrors.label(), "No errors");
    }

    #[test]
    fn test_status_empty_log() {
        let log = content("");
        assert!(log.is_empty());
        assert_eq!(log.status(), LogStatus::EmptyLog);
        assert_eq!(log.status().label(), "Empty log file");
        assert_eq!(log.excerpt(), "");
    }

    #[test]
    fn test_blank_line_is_not_empty() {
        assert_eq!(content("\n").status(), LogStatus::NoErrors);
    }

    #[test]
    fn test_excerpt_error_lines() {
        let log = content("ok\nERROR: bad thing\nok\nExiting, please requeue\nERROR: worse thing\n");
        assert_eq!(log.excerpt(), "ERROR: bad thing\nERROR: worse thing");
    }

    #[test]
    fn test_excerpt_keeps_traceback_body() {
        let log = content(
            "Current time: 10:00:00\nERROR: retrying\nTraceback (most recent call last):\n  File \"old.py\", line 1\nOSError: first\nok\nTraceback (most recent call last):\n  File \"run.py\", line 12, in main\n    transcribe(job)\nValueError: no audio stream\n",
        );
        assert_eq!(
            log.excerpt(),
            "ERROR: retrying\nTraceback (most recent call last):\nTraceback (most recent call last):\n  File \"run.py\", line 12, in main\n    transcribe(job)\nValueError: no audio stream"
        );
    }

    #[test]
    fn test_excerpt_long_traceback_keeps_exception_line() {
        let frames: String = (0..40).map(|i| format!("  frame {i}\n")).collect();
        let text = format!("Traceback (most recent call last):\n{frames}KeyError: 'video_process'\n");
        let excerpt = content(&text).excerpt();
        let lines: Vec<_> = excerpt.lines().collect();
        assert_eq!(lines.len(), EXCERPT_LINES);
        assert_eq!(lines[EXCERPT_LINES - 1], "KeyError: 'video_process'");
    }

    #[test]
    fn test_excerpt_tail_when_clean() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let excerpt = content(&text).excerpt();
        let lines: Vec<_> = excerpt.lines().collect();
        assert_eq!(lines.len(), EXCERPT_LINES);
        assert_eq!(lines[0], "line 10");
        assert_eq!(lines[EXCERPT_LINES - 1], "line 29");
    }

    #[test]
    fn test_datetime_from_filename() {
        let dt = datetime_from_filename(Path::new("/logs/LA/x_1703230348.txt")).unwrap();
        let expected = DateTime::from_timestamp(1_703_230_348, 0)
            .unwrap()
            .with_timezone(&Local);
        assert_eq!(dt, expected);
        assert_eq!(dt.timestamp(), 1_703_230_348);
    }

    #[test]
    fn test_datetime_uses_last_underscore() {
        let dt = datetime_from_filename(Path::new("transcript_process_0000000050.txt")).unwrap();
        assert_eq!(dt.timestamp(), 50);
    }

    #[test]
    fn test_datetime_from_bad_filename() {
        let result = datetime_from_filename(Path::new("audio_process_latest.txt"));
        assert!(matches!(result, Err(LogError::BadFilenameTimestamp { .. })));
    }

    #[test]
    fn test_read_missing_file() {
        let result = LogContent::read(Path::new("/nonexistent/audio_process_1.txt"));
        assert!(matches!(result, Err(LogError::Read { .. })));
    }

    #[test]
    fn test_format_runtime_days() {
        assert_eq!(format_runtime(TimeDelta::seconds(5)), "0:00:05");
        assert_eq!(format_runtime(TimeDelta::hours(25)), "1 day, 1:00:00");
        assert_eq!(format_runtime(TimeDelta::hours(50)), "2 days, 2:00:00");
        assert_eq!(format_runtime(TimeDelta::hours(-1)), "-1 day, 23:00:00");
    }
}
