use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Tables ────────────────────────────────────────────────────────────────────

/// One cell as rendered: trimmed text, or `None` when the cell was empty.
pub type Cell = Option<String>;

/// A table exactly as it came out of the markup. Labels need not be unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }
}

/// A [`RawTable`] that went through the column rules.
///
/// Only `normalize` builds one, so holding a `NormalizedTable` means the rank
/// columns, blank rows and header echoes have already been dealt with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTable {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Cell>>,
}

impl NormalizedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Back to a plain table, e.g. to run it through `normalize` again.
    pub fn into_raw(self) -> RawTable {
        RawTable::new(self.columns, self.rows)
    }
}

/// Row labels from a pinned column paired with the matching data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRowSet {
    pub names: Vec<String>,
    pub data: RawTable,
}

impl AlignedRowSet {
    /// Merge into one table with the label column first.
    pub fn into_table(self, name_label: &str) -> RawTable {
        let mut columns = Vec::with_capacity(self.data.columns.len() + 1);
        columns.push(name_label.to_string());
        columns.extend(self.data.columns);

        let rows = self
            .names
            .into_iter()
            .zip(self.data.rows)
            .map(|(name, data)| {
                let mut row = Vec::with_capacity(data.len() + 1);
                row.push(Some(name));
                row.extend(data);
                row
            })
            .collect();

        RawTable::new(columns, rows)
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// Fields stamped on every record of one page or section, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance(Vec<(String, String)>);

impl Provenance {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("-");
        }
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Field name → scalar. Field order is preserved: provenance first, then
/// the table columns left to right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord(Map<String, Value>);

impl CanonicalRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Records of one source in extraction order. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetResult {
    pub source: String,
    pub records: Vec<CanonicalRecord>,
}

impl DatasetResult {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    #[test]
    fn test_aligned_rows_merge_name_first() {
        let aligned = AlignedRowSet {
            names: vec!["Boston Celtics".into(), "New York Knicks".into()],
            data: RawTable::new(
                vec!["W".into(), "L".into()],
                vec![vec![s("61"), s("21")], vec![s("51"), s("31")]],
            ),
        };

        let table = aligned.into_table("Team");
        assert_eq!(table.columns, vec!["Team", "W", "L"]);
        assert_eq!(table.rows[1], vec![s("New York Knicks"), s("51"), s("31")]);
    }

    #[test]
    fn test_provenance_display() {
        let p = Provenance::none().with("Season", "2024-25").with("Conference", "Eastern");
        assert_eq!(p.to_string(), "Season=2024-25, Conference=Eastern");
        assert_eq!(Provenance::none().to_string(), "-");
    }
}
