//! Reading raw exports and writing canonical reports.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mobility_core::{model::CanonicalTable, ports::PortError, table::RawTable};

/// Read a raw CSV export.
pub(crate) fn read_raw(path: &Path) -> Result<RawTable> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    RawTable::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Read a required reference table.
pub(crate) fn read_reference<T, F>(path: &Path, what: &str, read: F) -> Result<T>
where
    F: FnOnce(BufReader<File>) -> Result<T, PortError>,
{
    let file = File::open(path)
        .with_context(|| format!("failed to open {what} {}", path.display()))?;
    read(BufReader::new(file))
        .with_context(|| format!("failed to read {what} from {}", path.display()))
}

/// Read an optional reference table. An unset or missing file yields `None`.
pub(crate) fn read_optional<T, F>(path: Option<&Path>, what: &str, read: F) -> Result<Option<T>>
where
    F: FnOnce(BufReader<File>) -> Result<T, PortError>,
{
    let Some(path) = path else {
        warn!(what, "Reference table not configured");
        return Ok(None);
    };
    match File::open(path) {
        Ok(file) => read(BufReader::new(file))
            .map(Some)
            .with_context(|| format!("failed to read {what} from {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(what, path = %path.display(), "Reference table not found");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("failed to open {}", path.display())),
    }
}

/// Write a table as CSV: header row in column order, dates as `YYYY-MM-DD`, absent values empty.
pub(crate) fn write_table(table: &CanonicalTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(table.columns())?;
    for record in table.records() {
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), rows = table.len(), "Wrote report");
    Ok(())
}
