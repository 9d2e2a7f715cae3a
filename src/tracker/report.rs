//! Writing tracking results into the network worksheet.

use chrono::{DateTime, Local};
use tracing::{debug, info};

use super::{TaskResult, TrackError};
use crate::sheets::{CellRef, SheetError, Worksheet, HEARTBEAT_CELL, SITE_ID_COL};

/// Timestamp format used in every date cell of the sheet.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cells written for one result, relative to the subtask's base column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCells {
    pub status: CellRef,
    pub last_run: CellRef,
    pub runtime: CellRef,
}

impl ResultCells {
    pub fn at(row: u32, base_col: u32) -> Self {
        Self {
            status: CellRef::new(row, base_col),
            last_run: CellRef::new(row, base_col + 1),
            runtime: CellRef::new(row, base_col + 2),
        }
    }
}

/// Write status (with the log excerpt as its note), last run and runtime of
/// every result into the row of its site.
///
/// A result whose subtask has no column in its category's layout is an error,
/// raised before anything is looked up or written for it.
pub async fn log_to_sheet(sheet: &dyn Worksheet, results: &[TaskResult]) -> Result<(), TrackError> {
    for result in results {
        let base_col = result
            .task
            .base_col(&result.subtask)
            .ok_or_else(|| TrackError::UnmappedSubtask {
                task: result.task,
                subtask: result.subtask.clone(),
            })?;
        let row = sheet.find_row(SITE_ID_COL, &result.site_id).await?;
        let cells = ResultCells::at(row, base_col);

        debug!(
            sheet = sheet.title(),
            site = %result.site_id,
            subtask = %result.subtask,
            row,
            base_col,
            "writing result"
        );

        sheet.update_cell(cells.status, result.status.label()).await?;
        sheet.update_note(cells.status, &result.logs).await?;
        sheet.update_cell(cells.last_run, &result.last_run_text()).await?;
        sheet.update_cell(cells.runtime, &result.runtime_text()).await?;
    }
    Ok(())
}

/// Stamp the heartbeat cell with the completion time of this run.
pub async fn log_completion(sheet: &dyn Worksheet, now: DateTime<Local>) -> Result<(), SheetError> {
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    sheet.update_cell(HEARTBEAT_CELL, &stamp).await?;
    info!(sheet = sheet.title(), %stamp, "recorded completion");
    Ok(())
}
