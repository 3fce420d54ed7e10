//! Workbook decoding.
//!
//! Bytes are sniffed once: OOXML packages go through `umya-spreadsheet`,
//! everything else goes through `calamine`'s format auto-detection. Both
//! backends produce a sparse cell map that is turned into a used-range grid
//! by [`grid_from_cells`].

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use calamine::{Data, Reader};
use tracing::{debug, warn};
use umya_spreadsheet::{CellRawValue, CellValue as UmyaCellValue};

use crate::error::{SheetError, SheetResult};
use crate::model::{CellValue, Grid, Sheet};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Anything that turns raw upload bytes into an ordered list of sheets.
pub trait WorkbookDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> SheetResult<Vec<Sheet>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SpreadsheetFormat {
    Xlsx,
    Xlsb,
    Ods,
    Xls,
    Unknown,
}

impl SpreadsheetFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(CFB_MAGIC) {
            return SpreadsheetFormat::Xls;
        }
        if !bytes.starts_with(ZIP_MAGIC) {
            return SpreadsheetFormat::Unknown;
        }
        let Ok(mut archive) = zip::ZipArchive::new(Cursor::new(bytes)) else {
            return SpreadsheetFormat::Unknown;
        };
        if archive.by_name("xl/workbook.xml").is_ok() {
            SpreadsheetFormat::Xlsx
        } else if archive.by_name("xl/workbook.bin").is_ok() {
            SpreadsheetFormat::Xlsb
        } else if archive.by_name("content.xml").is_ok() {
            SpreadsheetFormat::Ods
        } else {
            SpreadsheetFormat::Unknown
        }
    }
}

/// Builds the used-range grid (first to last occupied row and column) from
/// zero-based `(row, col)` coordinates. Gaps inside the range are `None`.
pub fn grid_from_cells(cells: BTreeMap<(u32, u32), CellValue>) -> Grid {
    let Some(bounds) = cells.keys().fold(None, |acc: Option<(u32, u32, u32, u32)>, &(r, c)| {
        Some(match acc {
            None => (r, r, c, c),
            Some((r0, r1, c0, c1)) => (r0.min(r), r1.max(r), c0.min(c), c1.max(c)),
        })
    }) else {
        return Vec::new();
    };
    let (first_row, last_row, first_col, last_col) = bounds;
    let width = (last_col - first_col + 1) as usize;
    let height = (last_row - first_row + 1) as usize;

    let mut grid: Grid = vec![vec![None; width]; height];
    for ((row, col), value) in cells {
        grid[(row - first_row) as usize][(col - first_col) as usize] = Some(value);
    }
    grid
}

fn text_or_absent(text: &str) -> Option<CellValue> {
    if text.is_empty() {
        None
    } else {
        Some(CellValue::Text(text.to_string()))
    }
}

// =============================================================================
// UMYA (OOXML)
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct UmyaDecoder;

impl UmyaDecoder {
    fn convert(cv: &UmyaCellValue) -> Option<CellValue> {
        let raw = cv.get_raw_value();
        if raw.is_empty() {
            return None;
        }
        if raw.is_error() {
            return text_or_absent(cv.get_value().as_ref());
        }
        match raw {
            CellRawValue::Numeric(n) => Some(CellValue::Number(*n)),
            CellRawValue::Bool(b) => Some(CellValue::Bool(*b)),
            CellRawValue::String(s) => text_or_absent(s.as_ref()),
            CellRawValue::RichText(rt) => text_or_absent(&rt.get_text()),
            CellRawValue::Lazy(s) => {
                let txt: &str = s.as_ref();
                if let Ok(n) = txt.parse::<f64>() {
                    Some(CellValue::Number(n))
                } else if txt.eq_ignore_ascii_case("TRUE") {
                    Some(CellValue::Bool(true))
                } else if txt.eq_ignore_ascii_case("FALSE") {
                    Some(CellValue::Bool(false))
                } else {
                    text_or_absent(txt)
                }
            }
            CellRawValue::Error(_) | CellRawValue::Empty => None,
        }
    }

    fn read<R: Read + Seek>(reader: R) -> SheetResult<Vec<Sheet>> {
        let book = umya_spreadsheet::reader::xlsx::read_reader(reader, true)
            .map_err(|e| SheetError::parse("xlsx", e))?;

        let mut sheets = Vec::new();
        for worksheet in book.get_sheet_collection() {
            let mut cells = BTreeMap::new();
            for cell in worksheet.get_cell_collection() {
                let coord = cell.get_coordinate();
                let (col, row) = (*coord.get_col_num(), *coord.get_row_num());
                if col == 0 || row == 0 {
                    continue;
                }
                if let Some(value) = Self::convert(cell.get_cell_value()) {
                    cells.insert((row - 1, col - 1), value);
                }
            }
            debug!(sheet = worksheet.get_name(), cells = cells.len(), "decoded sheet");
            sheets.push(Sheet::new(worksheet.get_name(), grid_from_cells(cells)));
        }
        Ok(sheets)
    }
}

impl WorkbookDecoder for UmyaDecoder {
    fn decode(&self, bytes: &[u8]) -> SheetResult<Vec<Sheet>> {
        Self::read(Cursor::new(bytes))
    }
}

// =============================================================================
// CALAMINE (XLS, XLSB, ODS, and fallback)
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineDecoder;

impl CalamineDecoder {
    fn convert(data: &Data) -> Option<CellValue> {
        match data {
            Data::Empty => None,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => text_or_absent(s),
            Data::Float(f) => Some(CellValue::Number(*f)),
            Data::Int(i) => Some(CellValue::Number(*i as f64)),
            Data::Bool(b) => Some(CellValue::Bool(*b)),
            Data::DateTime(dt) => Some(CellValue::Number(dt.as_f64())),
            Data::Error(e) => Some(CellValue::Text(e.to_string())),
        }
    }
}

impl WorkbookDecoder for CalamineDecoder {
    fn decode(&self, bytes: &[u8]) -> SheetResult<Vec<Sheet>> {
        let format = SpreadsheetFormat::sniff(bytes);
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| SheetError::parse(format.to_string(), e))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names().to_vec() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| SheetError::parse(format.to_string(), e))?;
            let (start_row, start_col) = range.start().unwrap_or_default();

            let mut cells = BTreeMap::new();
            for (row, col, data) in range.used_cells() {
                if let Some(value) = Self::convert(data) {
                    cells.insert((start_row + row as u32, start_col + col as u32), value);
                }
            }
            debug!(sheet = %name, cells = cells.len(), "decoded sheet");
            sheets.push(Sheet::new(name, grid_from_cells(cells)));
        }
        Ok(sheets)
    }
}

// =============================================================================
// AUTO
// =============================================================================

/// Picks the backend from the byte signature. This is the production decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDecoder;

impl WorkbookDecoder for AutoDecoder {
    fn decode(&self, bytes: &[u8]) -> SheetResult<Vec<Sheet>> {
        let format = SpreadsheetFormat::sniff(bytes);
        debug!(%format, bytes = bytes.len(), "decoding workbook");

        let sheets = match format {
            SpreadsheetFormat::Xlsx => UmyaDecoder.decode(bytes)?,
            _ => CalamineDecoder.decode(bytes)?,
        };

        if sheets.is_empty() {
            warn!(%format, "workbook contains no sheets");
            return Err(SheetError::parse(format.to_string(), "workbook contains no sheets"));
        }
        Ok(sheets)
    }
}

/// Decodes a workbook with the auto-detecting backend.
pub fn parse_workbook(bytes: &[u8]) -> SheetResult<Vec<Sheet>> {
    AutoDecoder.decode(bytes)
}
