//! Monitoring spreadsheet access.
//!
//! Each network has one worksheet (tab) named after it. Rows are sites, keyed
//! by the site id in column 1; columns hold per-subtask status, last run and
//! runtime. Two backends implement [`Worksheet`]:
//!
//! * [`local`]: a SQLite file, for staging runs and tests.
//! * [`google`]: the Google Sheets v4 REST API.

pub mod google;
pub mod local;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{SheetsBackend, SheetsConfig};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("value {value:?} not found in column {col} of worksheet {sheet:?}")]
    RowNotFound { sheet: String, col: u32, value: String },

    #[error("worksheet {0:?} not found in spreadsheet")]
    WorksheetNotFound(String),

    #[error("environment variable {0} with the Sheets access token is not set")]
    MissingToken(String),

    #[error("sheets API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to prepare workbook directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] r2d2::Error),
}

/// A 1-based (row, column) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1 notation, e.g. `(3, 18)` -> `R3`.
    pub fn a1(&self) -> String {
        format!("{}{}", column_letter(self.col), self.row)
    }
}

/// Cell holding the heartbeat: stamped at the end of every tracking run and
/// read by the Lochness staleness check.
pub const HEARTBEAT_CELL: CellRef = CellRef::new(3, 18);

/// Column holding the site id of each row.
pub const SITE_ID_COL: u32 = 1;

/// Operations the tracker needs from one worksheet.
#[async_trait::async_trait]
pub trait Worksheet: Send + Sync {
    fn title(&self) -> &str;

    /// First row whose cell in `col` equals `value`.
    async fn find_row(&self, col: u32, value: &str) -> Result<u32, SheetError>;

    /// Current value, `None` when the cell is blank.
    async fn read_cell(&self, cell: CellRef) -> Result<Option<String>, SheetError>;

    async fn update_cell(&self, cell: CellRef, value: &str) -> Result<(), SheetError>;

    /// Attach (or replace) the note shown when hovering the cell.
    async fn update_note(&self, cell: CellRef, note: &str) -> Result<(), SheetError>;
}

/// Open the worksheet named `title` on the configured backend.
pub async fn open_worksheet(
    cfg: &SheetsConfig,
    title: &str,
) -> Result<Box<dyn Worksheet>, SheetError> {
    match cfg.backend {
        SheetsBackend::Local => {
            let book = local::LocalWorkbook::open(&cfg.local_path)?;
            Ok(Box::new(book.worksheet(title)))
        }
        SheetsBackend::Google => {
            let token = std::env::var(&cfg.access_token_env)
                .map_err(|_| SheetError::MissingToken(cfg.access_token_env.clone()))?;
            let sheet = google::GoogleWorksheet::open(&cfg.spreadsheet_id, title, token).await?;
            Ok(Box::new(sheet))
        }
    }
}

/// Spreadsheet column letters: 1 -> `A`, 26 -> `Z`, 27 -> `AA`.
pub fn column_letter(col: u32) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(7), "G");
        assert_eq!(column_letter(18), "R");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_heartbeat_a1() {
        assert_eq!(HEARTBEAT_CELL.a1(), "R3");
        assert_eq!(CellRef::new(12, 23).a1(), "W12");
    }
}
