use crate::models::{Cell, CanonicalRecord, DatasetResult, NormalizedTable, Provenance};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;
use tracing::debug;

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(?:\d{1,3}(?:,\d{3})+|\d+)$").unwrap());
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(?:\d{1,3}(?:,\d{3})+|\d+)?\.\d+$").unwrap());

/// Append-only collection of one source's records.
#[derive(Debug)]
pub struct RecordAccumulator {
    dataset: DatasetResult,
}

impl RecordAccumulator {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            dataset: DatasetResult::new(source),
        }
    }

    /// One record per row, provenance fields first. Returns the number of
    /// records added. Rows are never deduplicated against earlier calls.
    pub fn append(&mut self, table: &NormalizedTable, provenance: &Provenance) -> usize {
        if table.is_empty() {
            debug!("{}: empty table [{}]", self.dataset.source, provenance);
            return 0;
        }
        let columns = table.columns();
        for row in table.rows() {
            let mut fields = Map::with_capacity(columns.len() + 2);
            for (field, value) in provenance.fields() {
                fields.insert(field.to_string(), Value::String(value.to_string()));
            }
            for (label, cell) in columns.iter().zip(row) {
                if fields.contains_key(label) {
                    continue;
                }
                fields.insert(label.clone(), cell_value(cell));
            }
            self.dataset.records.push(CanonicalRecord::new(fields));
        }

        debug!(
            "{}: +{} records [{}], {} total",
            self.dataset.source,
            table.len(),
            provenance,
            self.dataset.len()
        );
        table.len()
    }

    pub fn finish(self) -> DatasetResult {
        self.dataset
    }
}

/// Canonical scalar for a rendered cell: integer, float, null or text.
pub fn cell_value(cell: &Cell) -> Value {
    let Some(text) = cell.as_deref().map(str::trim) else {
        return Value::Null;
    };
    if text.is_empty() {
        return Value::Null;
    }

    if INTEGER.is_match(text) {
        if let Ok(n) = text.replace(',', "").parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if DECIMAL.is_match(text) {
        if let Some(n) = text
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
        {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{NormalizeRules, normalize};
    use crate::models::RawTable;
    use serde_json::json;

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    fn table(rows: &[[&str; 2]]) -> NormalizedTable {
        normalize(
            RawTable::new(
                vec!["Team".into(), "W".into()],
                rows.iter().map(|r| vec![s(r[0]), s(r[1])]).collect(),
            ),
            &NormalizeRules::default(),
        )
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(cell_value(&s("82")), json!(82));
        assert_eq!(cell_value(&s("1,234")), json!(1234));
        assert_eq!(cell_value(&s("-3")), json!(-3));
        assert_eq!(cell_value(&s(".500")), json!(0.5));
        assert_eq!(cell_value(&s("+4.2")), json!(4.2));
        assert_eq!(cell_value(&s("  ")), Value::Null);
        assert_eq!(cell_value(&None), Value::Null);
        assert_eq!(cell_value(&s("Sat, Nov 1, 2025")), json!("Sat, Nov 1, 2025"));
        assert_eq!(cell_value(&s("7:30p")), json!("7:30p"));
        assert_eq!(cell_value(&s("inf")), json!("inf"));
        assert_eq!(cell_value(&s("12,34")), json!("12,34"));
    }

    #[test]
    fn test_provenance_comes_first() {
        let mut acc = RecordAccumulator::new("standings");
        let prov = Provenance::none().with("Season", "2024-25").with("Conference", "Eastern");
        acc.append(&table(&[["Boston Celtics", "61"]]), &prov);

        let dataset = acc.finish();
        let fields: Vec<&str> = dataset.records[0].field_names().collect();
        assert_eq!(fields, vec!["Season", "Conference", "Team", "W"]);
        assert_eq!(dataset.records[0].get("W"), Some(&json!(61)));
    }

    #[test]
    fn test_append_keeps_duplicates_in_order() {
        let mut acc = RecordAccumulator::new("schedule");
        let page = table(&[["A", "1"], ["B", "2"]]);
        assert_eq!(acc.append(&page, &Provenance::none().with("Month", "October")), 2);
        assert_eq!(acc.append(&page, &Provenance::none().with("Month", "October")), 2);

        let dataset = acc.finish();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.records[0], dataset.records[2]);
        assert_eq!(dataset.records[3].get("Team"), Some(&json!("B")));
    }
}
