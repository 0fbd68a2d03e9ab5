use std::fs;
use std::path::{Path, PathBuf};

use calamine::{DataType, Reader, Xlsx, open_workbook};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::model::{RawHostRecord, VlanIdentity};

/// Something that can hand over the inventory rows of one VLAN.
pub trait RecordSource {
    fn fetch(&self, vlan: &VlanIdentity) -> Result<Vec<RawHostRecord>>;
}

/// Reads `<dir>/<sheet name>.xlsx`, falling back to `<dir>/<sheet name>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordSource for DirectorySource {
    fn fetch(&self, vlan: &VlanIdentity) -> Result<Vec<RawHostRecord>> {
        for extension in ["xlsx", "json"] {
            let path = self
                .dir
                .join(format!("{}.{extension}", vlan.display_name));
            if path.exists() {
                return read_records(&path);
            }
        }
        Err(ToolError::MissingSource {
            sheet: vlan.display_name.clone(),
            dir: self.dir.clone(),
        })
    }
}

/// Reads inventory rows from a workbook or a JSON snapshot, depending on the
/// file extension.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn read_records(path: &Path) -> Result<Vec<RawHostRecord>> {
    let records = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => read_json_records(path)?,
        _ => read_workbook_records(path)?,
    };
    debug!(record_count = records.len(), "records read");
    Ok(records)
}

fn read_json_records(path: &Path) -> Result<Vec<RawHostRecord>> {
    let source = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&source)?)
}

/// The first worksheet is the inventory; its first row holds the headers.
fn read_workbook_records(path: &Path) -> Result<Vec<RawHostRecord>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("{} has no sheets", path.display())))?
        .map_err(ToolError::from)?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(first_row) => first_row
            .iter()
            .map(|cell| cell_to_string(Some(cell)).trim().to_string())
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for row in rows {
        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() {
                continue;
            }
            object.insert(header.clone(), Value::String(cell_to_string(Some(cell))));
        }
        if object
            .values()
            .all(|value| value.as_str().is_some_and(|text| text.trim().is_empty()))
        {
            continue;
        }
        records.push(serde_json::from_value(Value::Object(object))?);
    }
    Ok(records)
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
