//! Writing a source's records out: pretty JSON (the canonical form) or CSV.

use crate::models::DatasetResult;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Array of field mappings, one per record, in insertion order.
pub fn to_json(dataset: &DatasetResult) -> Value {
    Value::Array(
        dataset
            .records
            .iter()
            .map(|r| Value::Object(r.as_map().clone()))
            .collect(),
    )
}

pub fn write_json(dataset: &DatasetResult, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Could not create {:?}", path))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &to_json(dataset))
        .with_context(|| format!("Failed to write {:?}", path))?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Header is the union of field names, in the order first seen. Fields a
/// record lacks are written empty.
pub fn write_csv(dataset: &DatasetResult, path: &Path) -> Result<()> {
    let mut header: Vec<&str> = Vec::new();
    for record in &dataset.records {
        for field in record.field_names() {
            if !header.contains(&field) {
                header.push(field);
            }
        }
    }

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Could not create {:?}", path))?;
    writer.write_record(&header)?;
    for record in &dataset.records {
        let row: Vec<String> = header
            .iter()
            .map(|field| record.get(field).map(scalar_text).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write `dataset` under `dir` as `file_name`, the extension swapped for
/// the format's own. Returns the path written.
pub fn export(
    dataset: &DatasetResult,
    dir: &Path,
    file_name: &str,
    format: ExportFormat,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Could not create dir {:?}", dir))?;
    let path = dir.join(file_name).with_extension(format.extension());

    match format {
        ExportFormat::Json => write_json(dataset, &path)?,
        ExportFormat::Csv => write_csv(dataset, &path)?,
    }

    info!("{}: {} records → {:?}", dataset.source, dataset.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalRecord;
    use serde_json::{Map, json};

    fn record(pairs: &[(&str, Value)]) -> CanonicalRecord {
        let mut map = Map::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        CanonicalRecord::new(map)
    }

    fn dataset() -> DatasetResult {
        let mut ds = DatasetResult::new("standings");
        ds.records.push(record(&[
            ("Season", json!("2024-25")),
            ("Team", json!("Boston Celtics")),
            ("W", json!(61)),
        ]));
        ds.records.push(record(&[
            ("Season", json!("2024-25")),
            ("Team", json!("Miami Heat")),
            ("GB", Value::Null),
            ("PCT", json!(0.451)),
        ]));
        ds
    }

    #[test]
    fn test_to_json_keeps_field_order() {
        let value = to_json(&dataset());
        let first = value[0].as_object().unwrap();
        let keys: Vec<&String> = first.keys().collect();
        assert_eq!(keys, vec!["Season", "Team", "W"]);
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_write_json_pretty_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&dataset(), dir.path(), "standings.json", ExportFormat::Json).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n"));
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, to_json(&dataset()));
        let expected = serde_json::to_string_pretty(&to_json(&dataset())).unwrap();
        assert_eq!(text, format!("{expected}\n"));
    }

    #[test]
    fn test_write_csv_unions_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&dataset(), dir.path(), "standings.json", ExportFormat::Csv).unwrap();
        assert_eq!(path.extension().unwrap(), "csv");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Season,Team,W,GB,PCT");
        assert_eq!(lines[1], "2024-25,Boston Celtics,61,,");
        assert_eq!(lines[2], "2024-25,Miami Heat,,,0.451");
    }

    #[test]
    fn test_empty_dataset_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&DatasetResult::new("x"), dir.path(), "x.json", ExportFormat::Json).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, json!([]));
    }
}
