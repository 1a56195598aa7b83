//! File writing utilities for citation export.
//!
//! The `export` command skips the store and dumps the deduplicated records
//! either as a pretty-printed JSON array or as CSV with a header row.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::Writer;

use crate::error::Result;
use crate::models::{CitationRecord, OutputFormat};

/// Write records to a file in the specified format.
///
/// Parent directories are created as needed. Returns the number of records
/// written.
///
/// # Errors
///
/// Returns an error if file creation or writing fails.
pub fn write_records_to_file(records: &[CitationRecord], format: OutputFormat, file_path: &Path) -> Result<usize> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    match format {
        OutputFormat::Csv => write_csv_file(records, file_path)?,
        OutputFormat::Json => write_json_file(records, file_path)?,
    }
    Ok(records.len())
}

/// Write records to a CSV file.
///
/// Header row: `pmid, journal, pubdate, volume, issue, title, abstract, page, author, language`
fn write_csv_file(records: &[CitationRecord], file_path: &Path) -> Result<()> {
    let file = File::create(file_path)?;
    let mut writer = Writer::from_writer(BufWriter::new(file));

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write records to a JSON file as one array.
fn write_json_file(records: &[CitationRecord], file_path: &Path) -> Result<()> {
    let file = File::create(file_path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}
