use std::collections::HashSet;
use std::io::{Cursor, Write};

use rollcall_core::error::{Result, RollcallError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Pack named files into an in-memory ZIP archive.
///
/// Repeated names get a ` (2)`, ` (3)` ... suffix before the extension.
pub fn write_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut used = HashSet::new();
    for (name, bytes) in entries {
        let name = unique_name(&mut used, name);
        writer.start_file(name, options).map_err(zip_error)?;
        writer.write_all(bytes)?;
    }

    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn zip_error(err: zip::result::ZipError) -> RollcallError {
    RollcallError::Io(std::io::Error::other(err))
}
