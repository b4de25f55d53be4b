// 📊 Spreadsheet input - workbook sheets → header + text records
//
// The registry export and the partner listings are published as workbooks.
// Every cell is rendered to the text the CSV path would have seen, so both
// formats go through the same column resolution.

use crate::error::Result;
use calamine::{open_workbook_auto, Data, Range, Reader};
use csv::StringRecord;
use std::path::Path;

/// Extensions read through calamine instead of the csv reader
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// First worksheet of a workbook; a workbook without sheets reads as empty
pub fn first_worksheet(path: &Path) -> Result<Range<Data>> {
    let mut workbook = open_workbook_auto(path)?;
    match workbook.worksheet_range_at(0) {
        Some(range) => Ok(range?),
        None => Ok(Range::empty()),
    }
}

/// Cell → text as a CSV export of the same sheet would carry it
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        // SIRETs and numeric codes are stored as floats
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    }
}

/// Split a sheet into its header row and the text records below it
pub fn records(range: &Range<Data>) -> (StringRecord, Vec<StringRecord>) {
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<StringRecord>());
    let headers = rows.next().unwrap_or_default();
    (headers, rows.collect())
}

/// Build an in-memory sheet, row by row
#[cfg(test)]
pub(crate) fn sheet(rows: &[Vec<Data>]) -> Range<Data> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let height = rows.len().max(1);
    let mut range = Range::new((0, 0), (height as u32 - 1, width as u32 - 1));
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            range.set_value((r as u32, c as u32), value.clone());
        }
    }
    range
}
