use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::RosterTable;
use crate::error::{Result, RollcallError};

/// Read an uploaded roster into a table, choosing the parser by file extension.
pub fn read_roster(file_name: &str, bytes: &[u8], delimiter: u8) -> Result<RosterTable> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(bytes, delimiter),
        "xls" | "xlsx" | "ods" => read_spreadsheet(bytes),
        _ => Err(RollcallError::Roster("unsupported file format".into())),
    }
}

fn read_csv(bytes: &[u8], delimiter: u8) -> Result<RosterTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers = rdr
        .headers()
        .map_err(|e| RollcallError::Roster(format!("CSV header error: {e}")))?
        .iter()
        .map(clean_cell)
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| RollcallError::Roster(format!("CSV parse error: {e}")))?;
        push_row(&mut rows, record.iter().map(clean_cell).collect());
    }

    Ok(RosterTable { headers, rows })
}

fn read_spreadsheet(bytes: &[u8]) -> Result<RosterTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| RollcallError::Roster(format!("cannot open spreadsheet: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| RollcallError::Roster("spreadsheet has no worksheets".into()))?
        .map_err(|e| RollcallError::Roster(format!("cannot read worksheet: {e}")))?;

    let mut sheet_rows = range.rows();
    let headers = sheet_rows
        .next()
        .map(|row| row.iter().map(data_cell).collect())
        .unwrap_or_default();

    let mut rows = Vec::new();
    for row in sheet_rows {
        push_row(&mut rows, row.iter().map(data_cell).collect());
    }

    Ok(RosterTable { headers, rows })
}

fn clean_cell(cell: &str) -> String {
    cell.trim_start_matches('\u{feff}').trim().to_string()
}

fn data_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => clean_cell(&other.to_string()),
    }
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|cell| !cell.is_empty()) {
        rows.push(row);
    }
}
