//! Atomic CSV export.
//!
//! The document is written to a temporary file beside the target and
//! renamed into place, so readers never observe a partial file.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::error::CsvError;

/// Render a header row followed by pre-formatted rows, one per line.
pub fn render(header: &[&str], rows: &[String]) -> String {
    let mut out = header
        .iter()
        .map(|field| quote(field))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

pub fn write_csv(path: &Path, header: &[&str], rows: &[String]) -> Result<(), CsvError> {
    let text = render(header, rows);
    let byte_count = text.len();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let fail = |clarification: &str| {
        CsvError::new(path, byte_count)
            .with_clarification(clarification)
            .with_recovery("Choose another location and export again.")
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|err| {
        error!(path = %path.display(), error = %err, "cannot create temporary CSV file");
        fail("The export file could not be created.").with_cause(err)
    })?;
    file.write_all(text.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| {
            error!(path = %path.display(), error = %err, "cannot write CSV data");
            fail("The export could not be written.").with_cause(err)
        })?;
    file.persist(path).map_err(|err| {
        error!(path = %path.display(), error = %err, "cannot move CSV into place");
        fail("The export could not be saved.").with_cause(err.error)
    })?;

    info!(path = %path.display(), bytes = byte_count, rows = rows.len(), "CSV written");
    Ok(())
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
