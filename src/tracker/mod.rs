//! Per-site log aggregation.
//!
//! A network's logs for one task category live under
//! `<root>/<site dir>/<subtask>_<unix ts>.txt`. For every site we pick the
//! newest log of each required subtask and turn it into a [`TaskResult`].
//! A missing subtask log aborts the whole run.

pub mod report;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, TimeDelta};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::config::{ConfigError, TrackerConfig};
use crate::logs::{self, parser, LogContent, LogError, LogStatus};
use crate::sheets::{SheetError, Worksheet};

/// Directory under a task's log root that aggregates all sites; not a site.
pub const TOTAL_DIR: &str = "TOTAL";

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("unknown task category {0:?}")]
    UnknownTask(String),

    #[error("no logs found for {subtask} at {dir}")]
    NoLogs { subtask: String, dir: PathBuf },

    #[error("subtask {subtask:?} has no column in the {task} layout")]
    UnmappedSubtask { task: TaskCategory, subtask: String },

    #[error("site directory {0} has no usable name")]
    BadSiteDir(PathBuf),

    #[error("failed to list sites under {path}: {source}")]
    ListSites {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sheet(#[from] SheetError),
}

// ---------------------------------------------------------------------------
// Task categories
// ---------------------------------------------------------------------------

/// One subtask of a category and where its block of cells starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtaskColumn {
    pub subtask: &'static str,
    /// Status column; last run and runtime follow it.
    pub base_col: u32,
}

const OFFSITE_LAYOUT: &[SubtaskColumn] = &[
    SubtaskColumn { subtask: "audio_process", base_col: 7 },
    SubtaskColumn { subtask: "transcript_process", base_col: 10 },
    SubtaskColumn { subtask: "video_process", base_col: 13 },
];

const DAILY_JOURNAL_LAYOUT: &[SubtaskColumn] = &[
    SubtaskColumn { subtask: "audio_process", base_col: 20 },
    SubtaskColumn { subtask: "transcript_process", base_col: 23 },
];

/// A class of pipeline run with its own subtasks and sheet layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Offsite,
    DailyJournal,
}

impl TaskCategory {
    /// Categories in the order a tracking run processes them.
    pub const ALL: [TaskCategory; 2] = [TaskCategory::DailyJournal, TaskCategory::Offsite];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Offsite => "offsite",
            TaskCategory::DailyJournal => "daily_journal",
        }
    }

    /// Required subtasks in declared order, with their sheet columns.
    pub fn layout(&self) -> &'static [SubtaskColumn] {
        match self {
            TaskCategory::Offsite => OFFSITE_LAYOUT,
            TaskCategory::DailyJournal => DAILY_JOURNAL_LAYOUT,
        }
    }

    pub fn subtasks(&self) -> impl Iterator<Item = &'static str> {
        self.layout().iter().map(|c| c.subtask)
    }

    /// Status column for `subtask`, `None` if it is not part of this category.
    pub fn base_col(&self, subtask: &str) -> Option<u32> {
        self.layout()
            .iter()
            .find(|c| c.subtask == subtask)
            .map(|c| c.base_col)
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offsite" => Ok(TaskCategory::Offsite),
            "daily_journal" => Ok(TaskCategory::DailyJournal),
            other => Err(TrackError::UnknownTask(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of the newest run of one subtask at one site.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task: TaskCategory,
    pub subtask: String,
    pub site_id: String,
    #[serde(serialize_with = "serialize_runtime")]
    pub runtime: TimeDelta,
    pub status: LogStatus,
    pub last_run: DateTime<Local>,
    /// Excerpt of the log, attached as a note to the status cell.
    pub logs: String,
    pub log_file: PathBuf,
}

impl TaskResult {
    pub fn runtime_text(&self) -> String {
        parser::format_runtime(self.runtime)
    }

    pub fn last_run_text(&self) -> String {
        self.last_run.format(report::TIMESTAMP_FORMAT).to_string()
    }
}

fn serialize_runtime<S: Serializer>(runtime: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&parser::format_runtime(*runtime))
}

/// Site id used as the row key in the sheet: the last two characters of the
/// site directory name (`PronetLA` -> `LA`).
pub fn site_id(site_dir: &Path) -> Result<String, TrackError> {
    let name = site_dir
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| TrackError::BadSiteDir(site_dir.to_path_buf()))?;
    let skip = name.chars().count().saturating_sub(2);
    Ok(name.chars().skip(skip).collect())
}

/// Site directories under a task's log root, in name order, without `TOTAL`.
pub fn list_sites(logs_root: &Path) -> Result<Vec<PathBuf>, TrackError> {
    let list_err = |source| TrackError::ListSites {
        path: logs_root.to_path_buf(),
        source,
    };

    let mut sites = Vec::new();
    for entry in std::fs::read_dir(logs_root).map_err(list_err)? {
        let path = entry.map_err(list_err)?.path();
        if !path.is_dir() || path.file_name().is_some_and(|n| n == TOTAL_DIR) {
            continue;
        }
        sites.push(path);
    }
    sites.sort();
    Ok(sites)
}

/// Build one [`TaskResult`] per required subtask of `task` for a site.
pub fn track_site(task: TaskCategory, site_dir: &Path) -> Result<Vec<TaskResult>, TrackError> {
    let site_id = site_id(site_dir)?;
    let _span = info_span!("site", %task, site = %site_id).entered();
    info!(dir = %site_dir.display(), "tracking {task} logs for site");

    let mut results = Vec::with_capacity(task.layout().len());
    for subtask in task.subtasks() {
        let candidates = logs::find_subtask_logs(site_dir, subtask)?;
        if candidates.is_empty() {
            return Err(TrackError::NoLogs {
                subtask: subtask.to_string(),
                dir: site_dir.to_path_buf(),
            });
        }

        let recent = logs::most_recent(&candidates)?;
        let content = LogContent::read(&recent)?;
        let runtime = content.runtime()?;
        let last_run = parser::datetime_from_filename(&recent)?;
        let status = content.status();

        debug!(
            subtask,
            log = %recent.display(),
            runtime = %parser::format_runtime(runtime),
            %last_run,
            %status,
            "parsed log"
        );

        results.push(TaskResult {
            task,
            subtask: subtask.to_string(),
            site_id: site_id.clone(),
            runtime,
            status,
            last_run,
            logs: content.excerpt(),
            log_file: recent,
        });
    }

    Ok(results)
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Totals of one tracking run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TrackingSummary {
    pub sites: usize,
    pub results: usize,
    pub errors: usize,
}

impl TrackingSummary {
    fn absorb(&mut self, results: &[TaskResult]) {
        self.sites += 1;
        self.results += results.len();
        self.errors += results.iter().filter(|r| r.status.is_error()).count();
    }
}

/// Track every site of `network` for one task category and write the results.
pub async fn track_logs(
    cfg: &TrackerConfig,
    sheet: &dyn Worksheet,
    network: &str,
    task: TaskCategory,
) -> Result<TrackingSummary, TrackError> {
    info!(%network, %task, "tracking logs");
    let logs_root = cfg.network_logs_path(network, task.as_str())?;
    info!(path = %logs_root.display(), "logs path");

    let mut summary = TrackingSummary::default();
    for site_dir in list_sites(logs_root)? {
        let results = track_site(task, &site_dir)?;
        report::log_to_sheet(sheet, &results).await?;
        summary.absorb(&results);
    }
    Ok(summary)
}

/// Full run for a network: every task category, then the completion stamp.
pub async fn run_tracking(
    cfg: &TrackerConfig,
    sheet: &dyn Worksheet,
    network: &str,
    now: DateTime<Local>,
) -> Result<TrackingSummary, TrackError> {
    let mut total = TrackingSummary::default();
    for task in TaskCategory::ALL {
        info!(%task, "on task");
        let summary = track_logs(cfg, sheet, network, task).await?;
        total.sites += summary.sites;
        total.results += summary.results;
        total.errors += summary.errors;
    }

    report::log_completion(sheet, now).await?;
    Ok(total)
}
