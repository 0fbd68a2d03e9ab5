use std::fs;
use std::path::Path;

use rust_xlsxwriter::Workbook;

use crate::vlan::tools::error::Result;
use crate::vlan::tools::model::{RECORD_HEADERS, RawHostRecord};

/// File format of a record snapshot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Xlsx,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Xlsx => "xlsx",
        }
    }
}

/// Writes the records so that [`read_records`](super::sheet_read::read_records)
/// reads them back unchanged.
pub fn write_records(path: &Path, records: &[RawHostRecord], format: SnapshotFormat) -> Result<()> {
    match format {
        SnapshotFormat::Json => {
            let json_string = serde_json::to_string_pretty(records)?;
            fs::write(path, json_string)?;
            Ok(())
        }
        SnapshotFormat::Xlsx => write_workbook(path, records),
    }
}

fn write_workbook(path: &Path, records: &[RawHostRecord]) -> Result<()> {
    let mut workbook_writer = Workbook::new();
    let worksheet = workbook_writer.add_worksheet();

    for (col_idx, header) in RECORD_HEADERS.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, *header)?;
    }

    for (row_idx, record) in records.iter().enumerate() {
        for (col_idx, cell) in record.cells().iter().enumerate() {
            worksheet.write_string((row_idx + 1) as u32, col_idx as u16, *cell)?;
        }
    }

    workbook_writer.save(path)?;
    Ok(())
}
