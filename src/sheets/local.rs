//! SQLite-backed workbook.
//!
//! Stores every worksheet of the workbook in a single `cells` table keyed by
//! (sheet, row, col). Good enough to stage a network before pointing the
//! tracker at the real spreadsheet, and to run the tracker in tests.

use std::path::Path;

use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{CellRef, SheetError, Worksheet};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Create the workbook tables if they do not exist yet.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cells (
            sheet TEXT NOT NULL,
            row_idx INTEGER NOT NULL,
            col_idx INTEGER NOT NULL,
            value TEXT,
            note TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (sheet, row_idx, col_idx)
        );

        CREATE INDEX IF NOT EXISTS idx_cells_lookup ON cells(sheet, col_idx, value);",
    )
}

/// A workbook file holding any number of worksheets.
#[derive(Clone)]
pub struct LocalWorkbook {
    pool: Pool,
}

impl LocalWorkbook {
    /// Open (or create) the workbook at `path`.
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SheetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = R2D2Pool::new(manager)?;

        let conn = pool.get()?;
        migrate(&conn)?;

        tracing::debug!(path = %path.display(), "opened local workbook");
        Ok(Self { pool })
    }

    pub fn worksheet(&self, title: &str) -> LocalWorksheet {
        LocalWorksheet {
            pool: self.pool.clone(),
            title: title.to_string(),
        }
    }
}

/// One non-blank cell as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredCell {
    pub row: u32,
    pub col: u32,
    pub value: Option<String>,
    pub note: Option<String>,
}

/// One tab of a [`LocalWorkbook`].
#[derive(Clone)]
pub struct LocalWorksheet {
    pool: Pool,
    title: String,
}

impl LocalWorksheet {
    /// Every stored cell of this worksheet, ordered by row then column.
    pub fn cells(&self) -> Result<Vec<StoredCell>, SheetError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT row_idx, col_idx, value, note FROM cells
             WHERE sheet = ?1 ORDER BY row_idx, col_idx",
        )?;
        let rows = stmt.query_map(params![self.title], |row| {
            Ok(StoredCell {
                row: row.get(0)?,
                col: row.get(1)?,
                value: row.get(2)?,
                note: row.get(3)?,
            })
        })?;
        let cells = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cells)
    }

    /// Note attached to `cell`, if any.
    pub fn read_note(&self, cell: CellRef) -> Result<Option<String>, SheetError> {
        let conn = self.pool.get()?;
        let note = conn
            .query_row(
                "SELECT note FROM cells WHERE sheet = ?1 AND row_idx = ?2 AND col_idx = ?3",
                params![self.title, cell.row, cell.col],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(note.flatten())
    }
}

#[async_trait::async_trait]
impl Worksheet for LocalWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn find_row(&self, col: u32, value: &str) -> Result<u32, SheetError> {
        let conn = self.pool.get()?;
        let row: Option<u32> = conn
            .query_row(
                "SELECT row_idx FROM cells
                 WHERE sheet = ?1 AND col_idx = ?2 AND value = ?3
                 ORDER BY row_idx LIMIT 1",
                params![self.title, col, value],
                |row| row.get(0),
            )
            .optional()?;

        row.ok_or_else(|| SheetError::RowNotFound {
            sheet: self.title.clone(),
            col,
            value: value.to_string(),
        })
    }

    async fn read_cell(&self, cell: CellRef) -> Result<Option<String>, SheetError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM cells WHERE sheet = ?1 AND row_idx = ?2 AND col_idx = ?3",
                params![self.title, cell.row, cell.col],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten().filter(|v| !v.is_empty()))
    }

    async fn update_cell(&self, cell: CellRef, value: &str) -> Result<(), SheetError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cells (sheet, row_idx, col_idx, value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sheet, row_idx, col_idx)
             DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![self.title, cell.row, cell.col, value],
        )?;
        Ok(())
    }

    async fn update_note(&self, cell: CellRef, note: &str) -> Result<(), SheetError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cells (sheet, row_idx, col_idx, note)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sheet, row_idx, col_idx)
             DO UPDATE SET note = excluded.note, updated_at = datetime('now')",
            params![self.title, cell.row, cell.col, note],
        )?;
        Ok(())
    }
}
