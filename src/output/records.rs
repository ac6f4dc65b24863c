//! JSON-lines record output

use crate::crawler::Record;
use crate::HarvestError;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes one JSON object per line
///
/// # Returns
///
/// * `Ok(usize)` - Number of records written
/// * `Err(HarvestError)` - Serialization or IO failure
pub fn write_records<W: Write>(records: &[Record], writer: W) -> Result<usize, HarvestError> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Writes records to a file, or to stdout when no path is given
pub fn write_records_to(records: &[Record], path: Option<&Path>) -> Result<usize, HarvestError> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let written = write_records(records, File::create(path)?)?;
            tracing::info!("Wrote {} records to {}", written, path.display());
            Ok(written)
        }
        None => write_records(records, io::stdout().lock()),
    }
}
