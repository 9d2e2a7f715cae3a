//! Google Sheets v4 REST backend.
//!
//! Authenticates with a pre-issued OAuth bearer token (for example minted by
//! `gcloud auth print-access-token` for the service account). Cell values go
//! through the `values` endpoints in A1 notation; notes need the numeric sheet
//! id and a `batchUpdate` request.

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{column_letter, CellRef, SheetError, Worksheet};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct GoogleWorksheet {
    client: Client,
    spreadsheet_id: String,
    title: String,
    sheet_id: i64,
    token: String,
}

impl GoogleWorksheet {
    /// Resolve the tab named `title` in `spreadsheet_id`.
    pub async fn open(spreadsheet_id: &str, title: &str, token: String) -> Result<Self, SheetError> {
        let client = Client::new();
        let url = format!("{API_BASE}/{spreadsheet_id}?fields=sheets.properties(sheetId,title)");
        let resp = client.get(&url).bearer_auth(&token).send().await?;
        let meta: SpreadsheetMeta = check(resp).await?.json().await?;

        let sheet_id = find_sheet_id(&meta, title)
            .ok_or_else(|| SheetError::WorksheetNotFound(title.to_string()))?;
        debug!(%spreadsheet_id, %title, sheet_id, "opened google worksheet");

        Ok(Self {
            client,
            spreadsheet_id: spreadsheet_id.to_string(),
            title: title.to_string(),
            sheet_id,
            token,
        })
    }

    fn values_url(&self, range: &str) -> Result<Url, SheetError> {
        let mut url = Url::parse(API_BASE).map_err(|e| SheetError::Api {
            status: 0,
            body: format!("bad API base url: {e}"),
        })?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&self.spreadsheet_id).push("values").push(range);
        }
        Ok(url)
    }

    /// `'Pronet'!R3`, quoted so tab names with spaces work.
    fn range(&self, a1: &str) -> String {
        format!("'{}'!{}", self.title.replace('\'', "''"), a1)
    }

    async fn get_values(&self, a1: &str) -> Result<ValueRange, SheetError> {
        let url = self.values_url(&self.range(a1))?;
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        Ok(check(resp).await?.json().await?)
    }
}

fn find_sheet_id(meta: &SpreadsheetMeta, title: &str) -> Option<i64> {
    meta.sheets
        .iter()
        .find(|s| s.properties.title == title)
        .map(|s| s.properties.sheet_id)
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SheetError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SheetError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl Worksheet for GoogleWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn find_row(&self, col: u32, value: &str) -> Result<u32, SheetError> {
        let letter = column_letter(col);
        let column = self.get_values(&format!("{letter}:{letter}")).await?;

        column
            .values
            .iter()
            .position(|row| row.first().map(cell_text).as_deref() == Some(value))
            .map(|idx| idx as u32 + 1)
            .ok_or_else(|| SheetError::RowNotFound {
                sheet: self.title.clone(),
                col,
                value: value.to_string(),
            })
    }

    async fn read_cell(&self, cell: CellRef) -> Result<Option<String>, SheetError> {
        let range = self.get_values(&cell.a1()).await?;
        Ok(range
            .values
            .first()
            .and_then(|row| row.first())
            .map(cell_text)
            .filter(|v| !v.is_empty()))
    }

    async fn update_cell(&self, cell: CellRef, value: &str) -> Result<(), SheetError> {
        let range = self.range(&cell.a1());
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [[value]],
        });
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn update_note(&self, cell: CellRef, note: &str) -> Result<(), SheetError> {
        let url = format!("{API_BASE}/{}:batchUpdate", self.spreadsheet_id);
        let body = json!({
            "requests": [{
                "updateCells": {
                    "range": {
                        "sheetId": self.sheet_id,
                        "startRowIndex": cell.row - 1,
                        "endRowIndex": cell.row,
                        "startColumnIndex": cell.col - 1,
                        "endColumnIndex": cell.col,
                    },
                    "rows": [{ "values": [{ "note": note }] }],
                    "fields": "note",
                }
            }]
        });
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}
