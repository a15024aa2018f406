//! Worksheet persistence for the ledger.
//!
//! A worksheet is a named table with a header row and an ordered list of data
//! rows. Rows are addressed by their 0-based data index (the header is not a data
//! row). Every mutation goes through `apply`, which commits a batch atomically.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{CounterError, Result};

/// One cell value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(i64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Text content, or `None` for numbers and empty cells.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rendered form, the way a spreadsheet would display it.
    pub fn display(&self) -> String {
        match self {
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Empty => String::new(),
        }
    }
}

/// A single worksheet mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum SheetOp {
    SetHeader {
        sheet: String,
        header: Vec<String>,
    },
    AppendRow {
        sheet: String,
        cells: Vec<Cell>,
    },
    UpdateCell {
        sheet: String,
        row: usize,
        col: usize,
        value: Cell,
    },
}

pub trait WorksheetStore {
    /// Create `sheet` with `header` if it does not exist. Existing sheets are left
    /// untouched.
    fn ensure_sheet(&mut self, sheet: &str, header: &[String]) -> Result<()>;

    fn header(&self, sheet: &str) -> Result<Vec<String>>;

    /// Data rows in insertion order.
    fn rows(&self, sheet: &str) -> Result<Vec<Vec<Cell>>>;

    /// Apply every op or none of them.
    fn apply(&mut self, ops: &[SheetOp]) -> Result<()>;

    fn append_row(&mut self, sheet: &str, cells: Vec<Cell>) -> Result<()> {
        self.apply(&[SheetOp::AppendRow {
            sheet: sheet.to_string(),
            cells,
        }])
    }

    fn update_cell(&mut self, sheet: &str, row: usize, col: usize, value: Cell) -> Result<()> {
        self.apply(&[SheetOp::UpdateCell {
            sheet: sheet.to_string(),
            row,
            col,
            value,
        }])
    }
}

fn missing_sheet(sheet: &str) -> CounterError {
    CounterError::PersistenceFailure(format!("worksheet '{}' does not exist", sheet))
}

fn missing_row(sheet: &str, row: usize) -> CounterError {
    CounterError::PersistenceFailure(format!("worksheet '{}' has no row {}", sheet, row))
}

fn set_cell(cells: &mut Vec<Cell>, col: usize, value: Cell) {
    if cells.len() <= col {
        cells.resize(col + 1, Cell::Empty);
    }
    cells[col] = value;
}

pub struct SqliteWorksheetStore {
    conn: Connection,
}

impl SqliteWorksheetStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = crate::open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS worksheets (
              name TEXT PRIMARY KEY,
              header_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS worksheet_rows (
              sheet TEXT NOT NULL,
              row_index INTEGER NOT NULL,
              cells_json TEXT NOT NULL,
              PRIMARY KEY (sheet, row_index)
            );
            "#,
        )?;
        Ok(())
    }

    fn sheet_exists(conn: &Connection, sheet: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM worksheets WHERE name = ?1",
                params![sheet],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn apply_op(tx: &Connection, op: &SheetOp) -> Result<()> {
        match op {
            SheetOp::SetHeader { sheet, header } => {
                let header_json = serde_json::to_string(header)?;
                tx.execute(
                    r#"
                    INSERT INTO worksheets(name, header_json) VALUES (?1, ?2)
                    ON CONFLICT(name) DO UPDATE SET header_json = excluded.header_json
                    "#,
                    params![sheet, header_json],
                )?;
            }
            SheetOp::AppendRow { sheet, cells } => {
                if !Self::sheet_exists(tx, sheet)? {
                    return Err(missing_sheet(sheet));
                }
                let next_index: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(row_index) + 1, 0) FROM worksheet_rows WHERE sheet = ?1",
                    params![sheet],
                    |row| row.get(0),
                )?;
                let cells_json = serde_json::to_string(cells)?;
                tx.execute(
                    "INSERT INTO worksheet_rows(sheet, row_index, cells_json) VALUES (?1, ?2, ?3)",
                    params![sheet, next_index, cells_json],
                )?;
            }
            SheetOp::UpdateCell {
                sheet,
                row,
                col,
                value,
            } => {
                let row_index =
                    i64::try_from(*row).map_err(|_| missing_row(sheet, *row))?;
                let cells_json: Option<String> = tx
                    .query_row(
                        "SELECT cells_json FROM worksheet_rows WHERE sheet = ?1 AND row_index = ?2",
                        params![sheet, row_index],
                        |r| r.get(0),
                    )
                    .optional()?;
                let Some(cells_json) = cells_json else {
                    return Err(missing_row(sheet, *row));
                };
                let mut cells: Vec<Cell> = serde_json::from_str(&cells_json)?;
                set_cell(&mut cells, *col, value.clone());
                tx.execute(
                    "UPDATE worksheet_rows SET cells_json = ?3 WHERE sheet = ?1 AND row_index = ?2",
                    params![sheet, row_index, serde_json::to_string(&cells)?],
                )?;
            }
        }
        Ok(())
    }
}

impl WorksheetStore for SqliteWorksheetStore {
    fn ensure_sheet(&mut self, sheet: &str, header: &[String]) -> Result<()> {
        if Self::sheet_exists(&self.conn, sheet)? {
            return Ok(());
        }
        self.apply(&[SheetOp::SetHeader {
            sheet: sheet.to_string(),
            header: header.to_vec(),
        }])
    }

    fn header(&self, sheet: &str) -> Result<Vec<String>> {
        let header_json: Option<String> = self
            .conn
            .query_row(
                "SELECT header_json FROM worksheets WHERE name = ?1",
                params![sheet],
                |row| row.get(0),
            )
            .optional()?;
        let header_json = header_json.ok_or_else(|| missing_sheet(sheet))?;
        Ok(serde_json::from_str(&header_json)?)
    }

    fn rows(&self, sheet: &str) -> Result<Vec<Vec<Cell>>> {
        if !Self::sheet_exists(&self.conn, sheet)? {
            return Err(missing_sheet(sheet));
        }
        let payloads = {
            let mut stmt = self.conn.prepare(
                "SELECT cells_json FROM worksheet_rows WHERE sheet = ?1 ORDER BY row_index ASC",
            )?;
            let mut rows = stmt.query(params![sheet])?;
            let mut payloads = Vec::new();
            while let Some(row) = rows.next()? {
                let payload: String = row.get(0)?;
                payloads.push(payload);
            }
            payloads
        };

        let mut out = Vec::with_capacity(payloads.len());
        for payload in payloads {
            out.push(serde_json::from_str(&payload)?);
        }
        Ok(out)
    }

    fn apply(&mut self, ops: &[SheetOp]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for op in ops {
            Self::apply_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct InMemorySheet {
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Worksheet store held in memory. Used by tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWorksheetStore {
    sheets: HashMap<String, InMemorySheet>,
}

impl InMemoryWorksheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_op(sheets: &mut HashMap<String, InMemorySheet>, op: &SheetOp) -> Result<()> {
        match op {
            SheetOp::SetHeader { sheet, header } => {
                sheets.entry(sheet.clone()).or_default().header = header.clone();
            }
            SheetOp::AppendRow { sheet, cells } => {
                let target = sheets.get_mut(sheet).ok_or_else(|| missing_sheet(sheet))?;
                target.rows.push(cells.clone());
            }
            SheetOp::UpdateCell {
                sheet,
                row,
                col,
                value,
            } => {
                let target = sheets.get_mut(sheet).ok_or_else(|| missing_sheet(sheet))?;
                let cells = target
                    .rows
                    .get_mut(*row)
                    .ok_or_else(|| missing_row(sheet, *row))?;
                set_cell(cells, *col, value.clone());
            }
        }
        Ok(())
    }
}

impl WorksheetStore for InMemoryWorksheetStore {
    fn ensure_sheet(&mut self, sheet: &str, header: &[String]) -> Result<()> {
        self.sheets
            .entry(sheet.to_string())
            .or_insert_with(|| InMemorySheet {
                header: header.to_vec(),
                rows: Vec::new(),
            });
        Ok(())
    }

    fn header(&self, sheet: &str) -> Result<Vec<String>> {
        self.sheets
            .get(sheet)
            .map(|s| s.header.clone())
            .ok_or_else(|| missing_sheet(sheet))
    }

    fn rows(&self, sheet: &str) -> Result<Vec<Vec<Cell>>> {
        self.sheets
            .get(sheet)
            .map(|s| s.rows.clone())
            .ok_or_else(|| missing_sheet(sheet))
    }

    fn apply(&mut self, ops: &[SheetOp]) -> Result<()> {
        let mut staged = self.sheets.clone();
        for op in ops {
            Self::apply_op(&mut staged, op)?;
        }
        self.sheets = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    fn exercise_store(store: &mut dyn WorksheetStore) {
        store.ensure_sheet("S", &header()).unwrap();
        store
            .append_row("S", vec![Cell::text("x"), Cell::Number(1)])
            .unwrap();
        store
            .append_row("S", vec![Cell::text("y"), Cell::Empty])
            .unwrap();
        store.update_cell("S", 1, 3, Cell::text("Yes")).unwrap();

        let rows = store.rows("S").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![Cell::text("x"), Cell::Number(1)]);
        assert_eq!(
            rows[1],
            vec![Cell::text("y"), Cell::Empty, Cell::Empty, Cell::text("Yes")]
        );

        // A failing op rolls back the whole batch.
        let err = store
            .apply(&[
                SheetOp::AppendRow {
                    sheet: "S".into(),
                    cells: vec![Cell::text("z")],
                },
                SheetOp::UpdateCell {
                    sheet: "S".into(),
                    row: 99,
                    col: 0,
                    value: Cell::Empty,
                },
            ])
            .unwrap_err();
        assert!(matches!(err, CounterError::PersistenceFailure(_)));
        assert_eq!(store.rows("S").unwrap().len(), 2);

        // ensure_sheet does not clobber an existing header.
        store.ensure_sheet("S", &["Other".to_string()]).unwrap();
        assert_eq!(store.header("S").unwrap(), header());
    }

    #[test]
    fn in_memory_store_behaves_like_a_worksheet() {
        let mut store = InMemoryWorksheetStore::new();
        exercise_store(&mut store);
    }

    #[test]
    fn sqlite_store_behaves_like_a_worksheet() {
        let mut store = SqliteWorksheetStore::open(&crate::shared_memory_uri()).unwrap();
        exercise_store(&mut store);
    }

    #[test]
    fn missing_sheet_is_a_persistence_failure() {
        let store = InMemoryWorksheetStore::new();
        assert!(matches!(
            store.rows("nope"),
            Err(CounterError::PersistenceFailure(_))
        ));
    }

    #[test]
    fn cells_serialize_like_spreadsheet_values() {
        let json = serde_json::to_string(&vec![
            Cell::Number(3),
            Cell::text("N/A"),
            Cell::Empty,
        ])
        .unwrap();
        assert_eq!(json, r#"[3,"N/A",null]"#);
        let back: Vec<Cell> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Cell::Number(3), Cell::text("N/A"), Cell::Empty]);
    }
}
