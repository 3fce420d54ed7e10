//! Tabular view over `ExcelData`: single-key sorting, mapped-column
//! highlighting and a plain-text renderer.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::mapping::{ColumnMapping, Role};
use crate::model::{ExcelData, Row, display_string};
use crate::utils::column_index_to_letter;

pub const EMPTY_STATE_MESSAGE: &str = "No data to display";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: usize,
    pub direction: SortDirection,
}

/// The only mutable state the view owns: which column is sorted and how.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortState {
    key: Option<SortKey>,
}

impl SortState {
    pub fn key(&self) -> Option<SortKey> {
        self.key
    }

    /// Same column flips direction; another column starts ascending.
    pub fn toggle(&mut self, column: usize) {
        let direction = match self.key {
            Some(key) if key.column == column && key.direction == SortDirection::Asc => {
                SortDirection::Desc
            }
            _ => SortDirection::Asc,
        };
        self.key = Some(SortKey { column, direction });
    }

    pub fn clear(&mut self) {
        self.key = None;
    }
}

/// Locale-style comparison of display strings: accents and case are ignored
/// first, then accents break ties, then lowercase sorts before uppercase.
pub fn compare_display(a: &str, b: &str) -> Ordering {
    let folded = |s: &str| -> String {
        s.nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect()
    };
    let accented = |s: &str| -> String { s.nfd().flat_map(char::to_lowercase).collect() };
    let uppercase_mask = |s: &str| -> Vec<bool> { s.chars().map(char::is_uppercase).collect() };

    folded(a)
        .cmp(&folded(b))
        .then_with(|| accented(a).cmp(&accented(b)))
        .then_with(|| uppercase_mask(a).cmp(&uppercase_mask(b)))
        .then_with(|| a.cmp(b))
}

/// A body row together with its position in the unsorted input.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRow<'a> {
    pub source_index: usize,
    pub cells: &'a Row,
}

/// Rows in display order. Without a key the input order is kept; with one,
/// rows are ordered by the display string of that column. The sort is
/// stable, so rows with equal keys keep their relative input order in both
/// directions.
pub fn sort_rows(rows: &[Row], key: Option<SortKey>) -> Vec<IndexedRow<'_>> {
    let mut ordered: Vec<IndexedRow<'_>> = rows
        .iter()
        .enumerate()
        .map(|(source_index, cells)| IndexedRow {
            source_index,
            cells,
        })
        .collect();
    let Some(key) = key else {
        return ordered;
    };
    let keys: Vec<String> = rows
        .iter()
        .map(|row| display_string(row.get(key.column).unwrap_or(&None)))
        .collect();
    ordered.sort_by(|a, b| {
        let ordering = compare_display(&keys[a.source_index], &keys[b.source_index]);
        match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    ordered
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnHeader {
    pub index: usize,
    pub letter: String,
    pub title: String,
    pub mapped_role: Option<Role>,
    pub badge: Option<String>,
    pub tooltip: String,
    pub sort: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    pub source_index: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoColumns,
    NoRows,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableRender {
    Empty {
        reason: EmptyReason,
        message: &'static str,
    },
    Table {
        columns: Vec<ColumnHeader>,
        rows: Vec<RenderedRow>,
        total_rows: usize,
    },
}

impl TableRender {
    /// Highlighted column indices, in column order.
    pub fn mapped_columns(&self) -> Vec<usize> {
        match self {
            TableRender::Empty { .. } => Vec::new(),
            TableRender::Table { columns, .. } => columns
                .iter()
                .filter(|column| column.mapped_role.is_some())
                .map(|column| column.index)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Columns accept clicks for mapping.
    pub interactive: bool,
    pub max_rows: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            interactive: true,
            max_rows: None,
        }
    }
}

/// Builds the render model from the current data, mapping and sort state.
/// Nothing is cached, so highlight state always reflects `mapping`.
pub fn render(
    data: &ExcelData,
    mapping: Option<&ColumnMapping>,
    sort: &SortState,
    options: RenderOptions,
) -> TableRender {
    if data.headers.is_empty() {
        return TableRender::Empty {
            reason: EmptyReason::NoColumns,
            message: EMPTY_STATE_MESSAGE,
        };
    }
    if data.rows.is_empty() {
        return TableRender::Empty {
            reason: EmptyReason::NoRows,
            message: EMPTY_STATE_MESSAGE,
        };
    }

    let columns = data
        .headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let mapped_role = mapping.and_then(|m| m.role_for_column(index));
            let badge = mapped_role.map(Role::badge_label);
            let title = if header.is_empty() {
                format!("Column {}", index + 1)
            } else {
                header.clone()
            };
            let tooltip = match (options.interactive, &badge) {
                (true, Some(badge)) => format!("Mapped as {badge} (click to remap)"),
                (true, None) => format!("Click to map {title}"),
                (false, _) if header.is_empty() => format!("Column {}", index + 1),
                (false, _) => format!("Column {header}"),
            };
            let sort = sort
                .key()
                .filter(|key| key.column == index)
                .map(|key| key.direction);
            ColumnHeader {
                index,
                letter: column_index_to_letter(index),
                title,
                mapped_role,
                badge,
                tooltip,
                sort,
            }
        })
        .collect();

    let ordered = sort_rows(&data.rows, sort.key());
    let limit = options.max_rows.unwrap_or(usize::MAX);
    let rows = ordered
        .into_iter()
        .take(limit)
        .map(|row| RenderedRow {
            source_index: row.source_index,
            cells: row.cells.iter().map(display_string).collect(),
        })
        .collect();

    TableRender::Table {
        columns,
        rows,
        total_rows: data.rows.len(),
    }
}

/// Aligned plain-text table. Mapped columns carry their badge in brackets.
pub fn render_text(table: &TableRender) -> String {
    let (columns, rows, total_rows) = match table {
        TableRender::Empty { message, .. } => return format!("{message}\n"),
        TableRender::Table {
            columns,
            rows,
            total_rows,
        } => (columns, rows, *total_rows),
    };

    let titles: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut title = format!("{} {}", column.letter, column.title);
            if let Some(badge) = &column.badge {
                title.push_str(&format!(" [{badge}]"));
            }
            match column.sort {
                Some(SortDirection::Asc) => title.push_str(" ^"),
                Some(SortDirection::Desc) => title.push_str(" v"),
                None => {}
            }
            title
        })
        .collect();

    let mut widths: Vec<usize> = titles.iter().map(|t| t.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(&row.cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}", width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&titles));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in rows {
        out.push_str(&line(&row.cells));
        out.push('\n');
    }
    if rows.len() < total_rows {
        out.push_str(&format!("... {} of {} rows shown\n", rows.len(), total_rows));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, CellValue};

    fn text(value: &str) -> Cell {
        Some(CellValue::from(value))
    }

    fn num(value: f64) -> Cell {
        Some(CellValue::Number(value))
    }

    fn order(rows: &[Row], key: Option<SortKey>) -> Vec<usize> {
        sort_rows(rows, key).iter().map(|r| r.source_index).collect()
    }

    #[test]
    fn sorts_by_display_string() {
        let rows = vec![vec![text("b"), num(2.0)], vec![text("a"), num(1.0)]];
        let sorted = sort_rows(
            &rows,
            Some(SortKey {
                column: 0,
                direction: SortDirection::Asc,
            }),
        );
        assert_eq!(sorted[0].cells, &vec![text("a"), num(1.0)]);
        assert_eq!(sorted[1].cells, &vec![text("b"), num(2.0)]);
    }

    #[test]
    fn no_key_keeps_input_order() {
        let rows = vec![vec![text("z")], vec![text("a")], vec![None]];
        assert_eq!(order(&rows, None), vec![0, 1, 2]);
    }

    #[test]
    fn numbers_compare_as_text() {
        let rows = vec![vec![num(9.0)], vec![num(10.0)], vec![None]];
        let asc = Some(SortKey {
            column: 0,
            direction: SortDirection::Asc,
        });
        assert_eq!(order(&rows, asc), vec![2, 1, 0]);
    }

    #[test]
    fn equal_keys_keep_input_order_both_ways() {
        let rows = vec![
            vec![text("b"), text("1")],
            vec![text("a"), text("2")],
            vec![text("b"), text("3")],
            vec![text("a"), text("4")],
        ];
        let asc = SortKey {
            column: 0,
            direction: SortDirection::Asc,
        };
        let desc = SortKey {
            direction: SortDirection::Desc,
            ..asc
        };
        assert_eq!(order(&rows, Some(asc)), vec![1, 3, 0, 2]);
        assert_eq!(order(&rows, Some(desc)), vec![0, 2, 1, 3]);
    }

    #[test]
    fn collation_ignores_case_and_accents_first() {
        assert_eq!(compare_display("a", "B"), Ordering::Less);
        assert_eq!(compare_display("B", "a"), Ordering::Greater);
        assert_eq!(compare_display("a", "A"), Ordering::Less);
        assert_eq!(compare_display("é", "f"), Ordering::Less);
        assert_eq!(compare_display("e", "é"), Ordering::Less);
        assert_eq!(compare_display("", "a"), Ordering::Less);
        assert_eq!(compare_display("same", "same"), Ordering::Equal);
    }

    #[test]
    fn toggle_flips_then_resets_on_new_column() {
        let mut state = SortState::default();
        state.toggle(1);
        assert_eq!(state.key().unwrap().direction, SortDirection::Asc);
        state.toggle(1);
        assert_eq!(state.key().unwrap().direction, SortDirection::Desc);
        state.toggle(1);
        assert_eq!(state.key().unwrap().direction, SortDirection::Asc);
        state.toggle(1);
        state.toggle(0);
        assert_eq!(
            state.key(),
            Some(SortKey {
                column: 0,
                direction: SortDirection::Asc
            })
        );
    }

    #[test]
    fn render_distinguishes_empty_states() {
        let state = SortState::default();
        let no_columns = ExcelData::default();
        assert_eq!(
            render(&no_columns, None, &state, RenderOptions::default()),
            TableRender::Empty {
                reason: EmptyReason::NoColumns,
                message: EMPTY_STATE_MESSAGE
            }
        );
        let no_rows = ExcelData {
            headers: vec!["Style".into()],
            rows: vec![],
        };
        assert_eq!(
            render(&no_rows, None, &state, RenderOptions::default()),
            TableRender::Empty {
                reason: EmptyReason::NoRows,
                message: EMPTY_STATE_MESSAGE
            }
        );
    }

    #[test]
    fn render_tracks_mapping_changes() {
        let data = ExcelData {
            headers: vec!["Style".into(), "".into()],
            rows: vec![vec![text("A1"), text("red")]],
        };
        let state = SortState::default();
        let mapping = ColumnMapping::default()
            .with_assignment(Role::ColorName, 1, 2)
            .unwrap();
        let table = render(&data, Some(&mapping), &state, RenderOptions::default());
        assert_eq!(table.mapped_columns(), vec![1]);
        let TableRender::Table { columns, .. } = &table else {
            panic!("expected table");
        };
        assert_eq!(columns[1].title, "Column 2");
        assert_eq!(columns[1].badge.as_deref(), Some("color Name"));
        assert_eq!(columns[1].tooltip, "Mapped as color Name (click to remap)");
        assert_eq!(columns[0].tooltip, "Click to map Style");

        let moved = mapping.with_assignment(Role::Style, 1, 2).unwrap();
        let table = render(&data, Some(&moved), &state, RenderOptions::default());
        let TableRender::Table { columns, .. } = &table else {
            panic!("expected table");
        };
        assert_eq!(columns[1].mapped_role, Some(Role::Style));
        assert_eq!(columns[1].badge.as_deref(), Some("style"));
    }

    #[test]
    fn text_render_shows_badges_and_truncation() {
        let data = ExcelData {
            headers: vec!["Style".into(), "Brand".into()],
            rows: vec![
                vec![text("A1"), text("Nike")],
                vec![text("A2"), text("Adidas")],
            ],
        };
        let mapping = ColumnMapping::default()
            .with_assignment(Role::Brand, 1, 2)
            .unwrap();
        let mut state = SortState::default();
        state.toggle(1);
        let table = render(
            &data,
            Some(&mapping),
            &state,
            RenderOptions {
                interactive: false,
                max_rows: Some(1),
            },
        );
        let text = render_text(&table);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("A Style | B Brand [brand] ^"));
        let rule = format!("{}-+-{}", "-".repeat(7), "-".repeat(17));
        assert_eq!(lines.next(), Some(rule.as_str()));
        assert_eq!(lines.next(), Some("A2      | Adidas"));
        assert_eq!(lines.next(), Some("... 1 of 2 rows shown"));
    }
}
