use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CellValue, Row, display_string};

static IMAGE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(image|photo|picture|img)").expect("valid regex"));
static URL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").expect("valid regex"));

/// Zero-based column index to spreadsheet letters (0 -> A, 26 -> AA).
pub fn column_index_to_letter(index: usize) -> String {
    let mut column = index + 1;
    let mut name = String::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.insert(0, (b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    name
}

/// Inverse of [`column_index_to_letter`]. Returns `None` for anything that
/// is not a run of ASCII letters.
pub fn column_letter_to_index(letters: &str) -> Option<usize> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut value = 0usize;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        value = value.checked_mul(26)?.checked_add(digit)?;
    }
    Some(value - 1)
}

pub fn looks_like_url(value: Option<&CellValue>) -> bool {
    matches!(value, Some(CellValue::Text(text)) if URL_PREFIX.is_match(text.trim()))
}

pub fn looks_like_image_header(header: &str) -> bool {
    IMAGE_HEADER.is_match(header)
}

pub fn first_non_empty(rows: &[Row], column: usize) -> Option<&CellValue> {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(Option::as_ref))
        .find(|value| !value.to_string().trim().is_empty())
}

/// Up to three non-blank display values of a column, comma separated.
pub fn column_preview(column: Option<usize>, rows: &[Row]) -> String {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let Some(column) = column.filter(|column| *column < width) else {
        return "No values".to_string();
    };
    let values: Vec<String> = rows
        .iter()
        .map(|row| display_string(row.get(column).unwrap_or(&None)))
        .filter(|value| !value.trim().is_empty())
        .take(3)
        .collect();
    if values.is_empty() {
        "No values".to_string()
    } else {
        values.join(", ")
    }
}
