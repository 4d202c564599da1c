//! Work-Order Loader.
//!
//! Reads a header-row CSV into [`WorkOrderRecord`]s, one per data row, in
//! file order. No schema is enforced beyond "valid CSV with a header";
//! duplicate rows pass through untouched.

use std::io::Read;
use std::path::Path;

use meetingorder_shared::{MeetingOrderError, Result, WorkOrderRecord};
use tracing::{info, instrument};

/// Load work orders from a CSV file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_workorders(path: &Path) -> Result<Vec<WorkOrderRecord>> {
    let file = std::fs::File::open(path).map_err(|e| MeetingOrderError::io(path, e))?;
    let records = read_workorders(file)
        .map_err(|e| MeetingOrderError::Csv(format!("{}: {e}", path.display())))?;

    info!(count = records.len(), "work orders loaded");
    Ok(records)
}

/// Read work orders from any CSV source.
///
/// Short rows yield records with fewer fields; extra cells beyond the
/// header are ignored.
pub fn read_workorders<R: Read>(source: R) -> std::result::Result<Vec<WorkOrderRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = reader.headers()?.clone();

    reader
        .records()
        .map(|row| {
            let row = row?;
            Ok(WorkOrderRecord::from_pairs(
                headers.iter().zip(row.iter()),
            ))
        })
        .collect()
}
