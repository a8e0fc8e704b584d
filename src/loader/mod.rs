//! Reading exported datasets back in, for `inspect` and for whatever sits
//! downstream of the exports.

use crate::models::{CanonicalRecord, DatasetResult};
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fields that tag records with the page or section they came from.
pub const PROVENANCE_FIELDS: [&str; 3] = ["Month", "Season", "Conference"];

/// Load a JSON export. The source name is taken from the file stem.
pub fn read_json(path: &Path) -> Result<DatasetResult> {
    let source = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("No file name in {:?}", path))?
        .to_string();

    let text = std::fs::read_to_string(path).with_context(|| format!("Could not read {:?}", path))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {:?}", path))?;
    let Value::Array(items) = value else {
        bail!("{:?} is not an array of records", path);
    };

    let mut dataset = DatasetResult::new(source);
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => dataset.records.push(CanonicalRecord::new(map)),
            other => bail!("{:?}: item {} is not a record: {}", path, i, other),
        }
    }

    info!("{}: {} records loaded", dataset.source, dataset.len());
    Ok(dataset)
}

pub fn discover_exports(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    debug!("{} exports in {:?}", files.len(), dir);
    Ok(files)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub source: String,
    pub records: usize,
    /// Every field name seen, in first-seen order.
    pub fields: Vec<String>,
    /// Distinct values of each provenance field present.
    pub provenance: Vec<(String, BTreeSet<String>)>,
}

pub fn summarize(dataset: &DatasetResult) -> DatasetSummary {
    let mut fields: Vec<String> = Vec::new();
    for record in &dataset.records {
        for name in record.field_names() {
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
        }
    }

    let provenance = PROVENANCE_FIELDS
        .iter()
        .filter(|p| fields.iter().any(|f| f == *p))
        .map(|p| {
            let values = dataset
                .records
                .iter()
                .filter_map(|r| r.get(p))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            (p.to_string(), values)
        })
        .collect();

    DatasetSummary {
        source: dataset.source.clone(),
        records: dataset.len(),
        fields,
        provenance,
    }
}
