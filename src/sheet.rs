//! Header/body splitting and the per-sheet configuration record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::warn;

use crate::error::{SheetError, SheetResult};
use crate::mapping::{
    BRAND_HEADER, ColumnMapping, MSRP_HEADER, MappingProfile, MappingState, Role, STYLE_HEADER,
};
use crate::model::{Cell, CellValue, ExcelData, Grid, Row, Sheet, display_string};
use crate::utils::{first_non_empty, looks_like_image_header, looks_like_url};

const HEADER_SCAN_ROWS: usize = 50;

/// Splits `grid` into a header row and the body rows strictly after it.
///
/// Absent header cells become empty names so column positions stay stable.
/// Every body row is padded with absent cells or truncated to the header
/// width.
pub fn split(grid: &[Row], header_index: usize) -> ExcelData {
    let headers: Vec<String> = grid
        .get(header_index)
        .map(|row| row.iter().map(display_string).collect())
        .unwrap_or_default();
    let width = headers.len();
    let rows = grid
        .iter()
        .skip(header_index.saturating_add(1))
        .map(|row| normalize_row(row, width))
        .collect();
    ExcelData { headers, rows }
}

fn normalize_row(row: &[Cell], width: usize) -> Row {
    let mut cells: Row = row.iter().take(width).cloned().collect();
    cells.resize(width, None);
    cells
}

/// Picks the most header-like row among the first rows of `grid`.
///
/// Rows with fewer than two non-blank cells are skipped. The first row that
/// contains a style, brand or MSRP header wins outright; otherwise the row
/// with the most non-blank cells wins, earlier rows winning ties.
pub fn detect_header_row(grid: &[Row]) -> usize {
    let mut best_index = 0;
    let mut best_count = 0;
    for (index, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let values: Vec<String> = row
            .iter()
            .map(|cell| display_string(cell).trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
        if values.len() < 2 {
            continue;
        }
        let has_header_match = values.iter().any(|value| {
            STYLE_HEADER.is_match(value) || BRAND_HEADER.is_match(value) || MSRP_HEADER.is_match(value)
        });
        if has_header_match || values.len() > best_count {
            best_index = index;
            best_count = values.len();
            if has_header_match {
                break;
            }
        }
    }
    best_index
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderStrategy {
    Row(usize),
    Detect,
}

impl Default for HeaderStrategy {
    fn default() -> Self {
        HeaderStrategy::Row(0)
    }
}

impl HeaderStrategy {
    pub fn resolve(self, grid: &[Row]) -> usize {
        match self {
            HeaderStrategy::Detect => detect_header_row(grid),
            HeaderStrategy::Row(index) if index < grid.len() || index == 0 => index,
            HeaderStrategy::Row(index) => {
                warn!(index, rows = grid.len(), "header row beyond grid, using row 0");
                0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub header_strategy: HeaderStrategy,
    pub auto_map: bool,
}

/// Where the effective value of a role comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ValueSource {
    Manual(String),
    Column(usize),
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetValidation {
    pub sheet_index: usize,
    pub missing: Vec<Role>,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetConfig {
    pub name: String,
    pub original_index: usize,
    pub raw_data: Arc<Grid>,
    pub header_index: usize,
    pub excel_data: ExcelData,
    pub column_mapping: ColumnMapping,
    pub manual_brand_value: Option<String>,
    pub is_selected: bool,
}

impl SheetConfig {
    pub fn from_sheet(sheet: &Sheet, original_index: usize, options: LoadOptions) -> Self {
        let header_index = options.header_strategy.resolve(&sheet.grid);
        let excel_data = split(&sheet.grid, header_index);
        let column_mapping = if options.auto_map {
            ColumnMapping::auto_map(&excel_data.headers)
        } else {
            ColumnMapping::default()
        };
        Self {
            name: sheet.name.clone(),
            original_index,
            raw_data: Arc::clone(&sheet.grid),
            header_index,
            excel_data,
            column_mapping,
            manual_brand_value: None,
            is_selected: original_index == 0,
        }
    }

    pub fn header_count(&self) -> usize {
        self.excel_data.header_count()
    }

    /// Display name, falling back to the 1-based position for unnamed sheets.
    pub fn display_name(&self, position: usize) -> String {
        if self.name.trim().is_empty() {
            format!("Sheet {}", position + 1)
        } else {
            self.name.clone()
        }
    }

    /// Re-splits around a new header row. The mapping is rebuilt and the
    /// manual value dropped since column meaning may have changed.
    pub fn with_header_index(&self, header_index: usize, auto_map: bool) -> SheetResult<Self> {
        if header_index >= self.raw_data.len() {
            return Err(SheetError::HeaderIndexOutOfRange {
                index: header_index,
                row_count: self.raw_data.len(),
            });
        }
        let excel_data = split(&self.raw_data, header_index);
        let column_mapping = if auto_map {
            ColumnMapping::auto_map(&excel_data.headers)
        } else {
            ColumnMapping::default()
        };
        Ok(Self {
            header_index,
            excel_data,
            column_mapping,
            manual_brand_value: None,
            ..self.clone()
        })
    }

    pub fn with_mapping(&self, role: Role, column: usize) -> SheetResult<Self> {
        let column_mapping =
            self.column_mapping
                .with_assignment(role, column, self.header_count())?;
        Ok(Self {
            column_mapping,
            ..self.clone()
        })
    }

    pub fn with_role_cleared(&self, role: Role) -> Self {
        Self {
            column_mapping: self.column_mapping.with_role_cleared(role),
            ..self.clone()
        }
    }

    pub fn with_column_cleared(&self, column: usize) -> Self {
        Self {
            column_mapping: self.column_mapping.with_column_cleared(column),
            ..self.clone()
        }
    }

    /// Sets the manual brand. The value is trimmed; blank values are refused.
    pub fn with_manual_value(&self, value: &str) -> SheetResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SheetError::EmptyManualValue);
        }
        Ok(Self {
            manual_brand_value: Some(trimmed.to_string()),
            ..self.clone()
        })
    }

    pub fn without_manual_value(&self) -> Self {
        Self {
            manual_brand_value: None,
            ..self.clone()
        }
    }

    pub fn with_selection(&self, is_selected: bool) -> Self {
        Self {
            is_selected,
            ..self.clone()
        }
    }

    pub fn manual_value(&self, role: Role) -> Option<&str> {
        match role {
            Role::Brand => self.manual_brand_value.as_deref(),
            _ => None,
        }
    }

    /// Manual value first, then the mapped column.
    pub fn value_source(&self, role: Role) -> ValueSource {
        if let Some(manual) = self.manual_value(role) {
            return ValueSource::Manual(manual.to_string());
        }
        match self.column_mapping.get(role) {
            Some(column) => ValueSource::Column(column),
            None => ValueSource::Unmapped,
        }
    }

    pub fn effective_value(&self, role: Role, row: usize) -> Cell {
        match self.value_source(role) {
            ValueSource::Manual(value) => Some(CellValue::Text(value)),
            ValueSource::Column(column) => self.excel_data.cell(row, column).cloned(),
            ValueSource::Unmapped => None,
        }
    }

    /// One map per body row holding the display value of every role that
    /// has a source.
    pub fn effective_records(&self) -> Vec<BTreeMap<Role, String>> {
        let sources: Vec<Role> = Role::iter()
            .filter(|role| self.value_source(*role) != ValueSource::Unmapped)
            .collect();
        (0..self.excel_data.row_count())
            .map(|row| {
                sources
                    .iter()
                    .map(|role| (*role, display_string(&self.effective_value(*role, row))))
                    .collect()
            })
            .collect()
    }

    /// Unmapped until a column or manual value is set; FullyMapped once
    /// nothing required by `profile` is missing.
    pub fn mapping_state(&self, profile: MappingProfile) -> MappingState {
        if self.column_mapping.is_unmapped() && self.manual_brand_value.is_none() {
            MappingState::Unmapped
        } else if self.missing_required(profile).is_empty() {
            MappingState::FullyMapped
        } else {
            MappingState::PartiallyMapped
        }
    }

    /// Required roles with no value source. Image-only jobs also report
    /// `readImage` when no image column can be found at all.
    pub fn missing_required(&self, profile: MappingProfile) -> Vec<Role> {
        let mut missing: Vec<Role> = profile
            .required_roles()
            .iter()
            .copied()
            .filter(|role| self.value_source(*role) == ValueSource::Unmapped)
            .collect();
        if profile.requires_image_column() && self.image_column().is_none() {
            missing.push(Role::ReadImage);
        }
        missing
    }

    pub fn validate(&self, sheet_index: usize, profile: MappingProfile) -> SheetValidation {
        let missing = self.missing_required(profile);
        let is_valid = missing.is_empty()
            && self.excel_data.row_count() > 0
            && self.excel_data.headers_are_valid();
        SheetValidation {
            sheet_index,
            missing,
            is_valid,
        }
    }

    /// Image source column: readImage, then imageAdd, then column 0 when it
    /// looks like it holds images.
    pub fn image_column(&self) -> Option<usize> {
        self.column_mapping
            .read_image
            .or(self.column_mapping.image_add)
            .or_else(|| self.fallback_image_column())
    }

    fn fallback_image_column(&self) -> Option<usize> {
        let first_header = self.excel_data.headers.first()?;
        if looks_like_image_header(first_header) {
            return Some(0);
        }
        let sample = first_non_empty(&self.excel_data.rows, 0);
        looks_like_url(sample).then_some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn text(value: &str) -> Cell {
        Some(CellValue::from(value))
    }

    fn styled_sheet() -> Sheet {
        Sheet::new(
            "Products",
            vec![
                vec![text("Style"), text("Brand")],
                vec![text("A1"), text("Nike")],
                vec![text("A2"), text("Adidas")],
            ],
        )
    }

    #[test]
    fn split_uses_first_row_as_headers() {
        let sheet = styled_sheet();
        let data = split(&sheet.grid, 0);
        assert_eq!(data.headers, vec!["Style", "Brand"]);
        assert_eq!(
            data.rows,
            vec![vec![text("A1"), text("Nike")], vec![text("A2"), text("Adidas")]]
        );
    }

    #[test]
    fn split_pads_and_truncates_rows() {
        let grid = vec![
            vec![text("A"), None, text("C")],
            vec![text("1")],
            vec![text("1"), text("2"), text("3"), text("4")],
        ];
        let data = split(&grid, 0);
        assert_eq!(data.headers, vec!["A", "", "C"]);
        assert_eq!(data.rows[0], vec![text("1"), None, None]);
        assert_eq!(data.rows[1], vec![text("1"), text("2"), text("3")]);
    }

    #[test]
    fn split_past_end_is_empty() {
        let data = split(&styled_sheet().grid, 10);
        assert!(data.headers.is_empty());
        assert!(data.rows.is_empty());
    }

    #[test]
    fn detect_header_row_prefers_pattern_match() {
        let grid = vec![
            vec![text("Spring catalogue"), None, None],
            vec![text("x"), text("y"), text("z")],
            vec![text("SKU"), text("Vendor")],
            vec![text("A1"), text("Nike"), text("extra"), text("more")],
        ];
        assert_eq!(detect_header_row(&grid), 2);
    }

    #[test]
    fn detect_header_row_falls_back_to_widest_row() {
        let grid = vec![
            vec![text("title")],
            vec![text("a"), text("b")],
            vec![text("a"), text("b"), text("c")],
            vec![text("a"), text("b"), text("c")],
        ];
        assert_eq!(detect_header_row(&grid), 2);
        assert_eq!(detect_header_row(&[]), 0);
    }

    #[test]
    fn manual_brand_wins_over_mapped_column() {
        let config = SheetConfig::from_sheet(&styled_sheet(), 0, LoadOptions::default())
            .with_mapping(Role::Brand, 1)
            .unwrap()
            .with_manual_value("  Acme ")
            .unwrap();
        assert_eq!(config.effective_value(Role::Brand, 0), text("Acme"));
        assert_eq!(config.column_mapping.brand, Some(1));

        let cleared = config.without_manual_value();
        assert_eq!(cleared.effective_value(Role::Brand, 0), text("Nike"));
        assert_eq!(cleared.raw_data, config.raw_data);
    }

    #[test]
    fn blank_manual_value_is_refused() {
        let config = SheetConfig::from_sheet(&styled_sheet(), 0, LoadOptions::default());
        assert_matches!(config.with_manual_value("   "), Err(SheetError::EmptyManualValue));
    }

    #[test]
    fn header_change_resets_mapping_and_manual_value() {
        let config = SheetConfig::from_sheet(&styled_sheet(), 0, LoadOptions::default())
            .with_mapping(Role::Style, 0)
            .unwrap()
            .with_manual_value("Acme")
            .unwrap();
        let moved = config.with_header_index(1, false).unwrap();
        assert_eq!(moved.excel_data.headers, vec!["A1", "Nike"]);
        assert_eq!(moved.excel_data.rows.len(), 1);
        assert!(moved.column_mapping.is_unmapped());
        assert_eq!(moved.manual_brand_value, None);

        assert_matches!(
            config.with_header_index(3, false),
            Err(SheetError::HeaderIndexOutOfRange {
                index: 3,
                row_count: 3
            })
        );
    }

    #[test]
    fn validation_reports_missing_roles() {
        let config = SheetConfig::from_sheet(&styled_sheet(), 0, LoadOptions::default());
        let report = config.validate(0, MappingProfile::MsrpOnly);
        assert_eq!(report.missing, vec![Role::Style, Role::Msrp]);
        assert!(!report.is_valid);

        let mapped = config
            .with_mapping(Role::Style, 0)
            .unwrap()
            .with_mapping(Role::Msrp, 1)
            .unwrap();
        assert!(mapped.validate(0, MappingProfile::MsrpOnly).is_valid);
    }

    #[test]
    fn effective_records_cover_sourced_roles() {
        let config = SheetConfig::from_sheet(&styled_sheet(), 0, LoadOptions::default())
            .with_mapping(Role::Style, 0)
            .unwrap()
            .with_manual_value("Acme")
            .unwrap();
        let records = config.effective_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get(&Role::Style).map(String::as_str), Some("A2"));
        assert_eq!(records[1].get(&Role::Brand).map(String::as_str), Some("Acme"));
        assert!(!records[0].contains_key(&Role::Category));
    }

    #[test]
    fn image_column_falls_back_to_url_column() {
        let sheet = Sheet::new(
            "Links",
            vec![
                vec![text("Link"), text("Style")],
                vec![None, text("A1")],
                vec![text("https://cdn.example.com/a.jpg"), text("A2")],
            ],
        );
        let config = SheetConfig::from_sheet(&sheet, 0, LoadOptions::default());
        assert_eq!(config.image_column(), Some(0));

        let mapped = config.with_mapping(Role::ImageAdd, 1).unwrap();
        assert_eq!(mapped.image_column(), Some(1));
    }

    #[test]
    fn split_tolerates_any_header_index() {
        let sheet = styled_sheet();
        let data = split(&sheet.grid, usize::MAX);
        assert!(data.headers.is_empty());
        assert!(data.rows.is_empty());
    }

    #[test]
    fn mapping_state_tracks_validation_for_images_only() {
        let sheet = Sheet::new(
            "Codes",
            vec![
                vec![text("Style"), text("Notes")],
                vec![text("A1"), text("plain")],
            ],
        );
        let profile = MappingProfile::ImagesOnly;
        let config = SheetConfig::from_sheet(&sheet, 0, LoadOptions::default());
        assert_eq!(config.mapping_state(profile), MappingState::Unmapped);

        let styled = config.with_mapping(Role::Style, 0).unwrap();
        assert_eq!(styled.image_column(), None);
        assert_eq!(styled.missing_required(profile), vec![Role::ReadImage]);
        assert_eq!(styled.mapping_state(profile), MappingState::PartiallyMapped);

        let imaged = styled.with_mapping(Role::ReadImage, 1).unwrap();
        assert_eq!(imaged.mapping_state(profile), MappingState::FullyMapped);
    }

    #[test]
    fn manual_brand_counts_toward_mapping_state() {
        let profile = MappingProfile::MsrpOnly;
        let config = SheetConfig::from_sheet(&styled_sheet(), 0, LoadOptions::default())
            .with_manual_value("Acme")
            .unwrap();
        assert_eq!(config.mapping_state(profile), MappingState::PartiallyMapped);

        let full = config
            .with_mapping(Role::Style, 0)
            .unwrap()
            .with_mapping(Role::Msrp, 1)
            .unwrap();
        assert_eq!(full.mapping_state(profile), MappingState::FullyMapped);
        assert_eq!(
            full.without_manual_value().mapping_state(MappingProfile::GoogleImages),
            MappingState::FullyMapped
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn header_row_beyond_grid_warns_and_uses_row_zero() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let sheet = styled_sheet();
        let resolved = tracing::subscriber::with_default(subscriber, || {
            HeaderStrategy::Row(9).resolve(&sheet.grid)
        });
        assert_eq!(resolved, 0);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("header row beyond grid"));
    }
}
