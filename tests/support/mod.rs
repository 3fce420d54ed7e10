#![allow(dead_code)]

use std::path::{Path, PathBuf};

use sheetmap::model::{Cell, CellValue, Grid};
use tempfile::{TempDir, tempdir};
use umya_spreadsheet::{self, Spreadsheet};

pub fn write_workbook_to_path<F>(path: &Path, f: F)
where
    F: FnOnce(&mut Spreadsheet),
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    let mut book = umya_spreadsheet::new_file();
    f(&mut book);
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

/// Serialized `.xlsx` bytes for a workbook built by `f`.
pub fn xlsx_bytes<F>(f: F) -> Vec<u8>
where
    F: FnOnce(&mut Spreadsheet),
{
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("fixture.xlsx");
    write_workbook_to_path(&path, f);
    std::fs::read(&path).expect("read workbook")
}

const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const ODS_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#;

/// A cell in an `.ods` fixture row.
pub enum OdsCell<'a> {
    Text(&'a str),
    Float(f64),
}

/// Serialized `.ods` bytes: one `table:table` per `(name, rows)` pair.
pub fn ods_bytes(tables: &[(&str, &[&[OdsCell<'_>]])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::FileOptions;

    let mut body = String::new();
    for (name, rows) in tables {
        body.push_str(&format!("<table:table table:name=\"{name}\">"));
        for row in rows.iter() {
            body.push_str("<table:table-row>");
            for cell in row.iter() {
                match cell {
                    OdsCell::Text(value) => body.push_str(&format!(
                        "<table:table-cell office:value-type=\"string\"><text:p>{value}</text:p></table:table-cell>"
                    )),
                    OdsCell::Float(value) => body.push_str(&format!(
                        "<table:table-cell office:value-type=\"float\" office:value=\"{value}\"><text:p>{value}</text:p></table:table-cell>"
                    )),
                }
            }
            body.push_str("</table:table-row>");
        }
        body.push_str("</table:table>");
    }
    let content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2"><office:body><office:spreadsheet>{body}</office:spreadsheet></office:body></office:document-content>"#
    );

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("mimetype", stored).expect("start mimetype");
    writer.write_all(ODS_MIMETYPE.as_bytes()).expect("write mimetype");
    writer
        .start_file("META-INF/manifest.xml", FileOptions::default())
        .expect("start manifest");
    writer.write_all(ODS_MANIFEST.as_bytes()).expect("write manifest");
    writer
        .start_file("content.xml", FileOptions::default())
        .expect("start content");
    writer.write_all(content.as_bytes()).expect("write content");
    writer.finish().expect("finish ods").into_inner()
}

/// The product list used across tests: style, brand, color and an image URL.
pub fn product_workbook(book: &mut Spreadsheet) {
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.set_name("Products");
    for (cell, value) in [
        ("A1", "Style"),
        ("B1", "Brand"),
        ("C1", "Color"),
        ("D1", "Image URL"),
        ("A2", "SKU-200"),
        ("B2", "Nike"),
        ("C2", "Red"),
        ("D2", "https://cdn.example.com/200.jpg"),
        ("A3", "SKU-100"),
        ("B3", "Adidas"),
        ("C3", "Blue"),
        ("D3", "https://cdn.example.com/100.jpg"),
    ] {
        sheet.get_cell_mut(cell).set_value(value);
    }

    let notes = book.new_sheet("Notes").unwrap();
    notes.get_cell_mut("A1").set_value("free text");
}

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        write_workbook_to_path(&path, f);
        path
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

pub fn text(value: &str) -> Cell {
    Some(CellValue::from(value))
}

/// Grid from string rows; empty strings become absent cells.
pub fn grid(rows: &[&[&str]]) -> Grid {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|value| if value.is_empty() { None } else { text(value) })
                .collect()
        })
        .collect()
}
