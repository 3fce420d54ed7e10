use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(number) => write!(f, "{}", number),
            CellValue::Bool(flag) => write!(f, "{}", flag),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// A single grid position. `None` is an absent cell.
pub type Cell = Option<CellValue>;
pub type Row = Vec<Cell>;
pub type Grid = Vec<Row>;

/// Text used for both rendering and sorting: absent cells become `""`.
pub fn display_string(cell: &Cell) -> String {
    match cell {
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

/// One named tab of a decoded workbook. Immutable once decoded; the grid is
/// shared with every `SheetConfig` derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub grid: Arc<Grid>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, grid: Grid) -> Self {
        Self {
            name: name.into(),
            grid: Arc::new(grid),
        }
    }

    pub fn row_count(&self) -> usize {
        self.grid.len()
    }

    pub fn column_count(&self) -> usize {
        self.grid.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Header names plus body rows. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcelData {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl ExcelData {
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.rows.is_empty()
    }

    /// At least one header cell carries non-blank text.
    pub fn headers_are_valid(&self) -> bool {
        self.headers.iter().any(|header| !header.trim().is_empty())
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|cells| cells.get(column)).and_then(Option::as_ref)
    }
}
