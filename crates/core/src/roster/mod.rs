//! Class roster files: reading, limits and name-column detection.

pub mod import;
pub mod reader;

pub use import::{ImportReport, ResetReport, RosterImporter, StudentCode};
pub use reader::read_roster;

use crate::config::RosterConfig;
use crate::error::{Result, RollcallError};

const FULL_NAME_HEADERS: &[&str] = &["фио", "full name", "fio"];
const LAST_NAME_HEADERS: &[&str] = &["фамилия", "surname", "last name"];
const FIRST_NAME_HEADERS: &[&str] = &["имя", "first name", "given name"];
const MIDDLE_NAME_HEADERS: &[&str] = &["отчество", "patronymic", "middle name"];

/// Placeholder stored when a student has no middle name.
pub const NO_MIDDLE_NAME: &str = "-";

/// A header row and the data rows under it, all cells trimmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RosterTable {
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn check_limits(&self, limits: &RosterConfig) -> Result<()> {
        if self.rows.len() >= limits.max_rows || self.column_count() >= limits.max_columns {
            return Err(RollcallError::Roster("student limit exceeded".into()));
        }
        Ok(())
    }

    fn find_column(&self, names: &[&str]) -> Option<usize> {
        self.headers.iter().position(|header| {
            let header = header.to_lowercase();
            names.iter().any(|name| header.contains(name))
        })
    }

    fn cell(row: &[String], index: usize) -> &str {
        row.get(index).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentName {
    pub last: String,
    pub first: String,
    pub middle: String,
}

impl StudentName {
    fn new(last: &str, first: &str, middle: &str) -> Self {
        let middle = if middle.is_empty() {
            NO_MIDDLE_NAME
        } else {
            middle
        };
        Self {
            last: last.to_string(),
            first: first.to_string(),
            middle: middle.to_string(),
        }
    }
}

/// Read a roster file, enforce the size limits and extract the student names.
///
/// `delimiter` only matters for CSV; it falls back to the configured default and then `,`.
pub fn parse_roster_file(
    limits: &RosterConfig,
    file_name: &str,
    bytes: &[u8],
    delimiter: Option<u8>,
) -> Result<Vec<StudentName>> {
    let delimiter = delimiter.or_else(|| limits.delimiter_byte()).unwrap_or(b',');
    let table = read_roster(file_name, bytes, delimiter)?;
    table.check_limits(limits)?;
    parse_roster(&table)
}

/// Extract student names from a roster.
///
/// A full-name column wins over separate last/first/middle columns. Every
/// row is validated before anything is returned.
pub fn parse_roster(table: &RosterTable) -> Result<Vec<StudentName>> {
    if let Some(column) = table.find_column(FULL_NAME_HEADERS) {
        return table
            .rows
            .iter()
            .map(|row| {
                let parts: Vec<&str> = RosterTable::cell(row, column).split_whitespace().collect();
                match parts.as_slice() {
                    [last, first] => Ok(StudentName::new(last, first, "")),
                    [last, first, middle] => Ok(StudentName::new(last, first, middle)),
                    _ => Err(RollcallError::Roster(
                        "not all full names follow the standard".into(),
                    )),
                }
            })
            .collect();
    }

    let columns = (
        table.find_column(LAST_NAME_HEADERS),
        table.find_column(FIRST_NAME_HEADERS),
        table.find_column(MIDDLE_NAME_HEADERS),
    );
    let (Some(last), Some(first), Some(middle)) = columns else {
        return Err(RollcallError::Roster("no recognizable name columns".into()));
    };

    table
        .rows
        .iter()
        .map(|row| {
            let name = StudentName::new(
                RosterTable::cell(row, last),
                RosterTable::cell(row, first),
                RosterTable::cell(row, middle),
            );
            if name.last.is_empty() || name.first.is_empty() {
                return Err(RollcallError::Roster(
                    "every student needs a last and a first name".into(),
                ));
            }
            Ok(name)
        })
        .collect()
}
