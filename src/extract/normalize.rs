//! Column rules that turn whatever a source rendered into one shape.
//!
//! Rules run in a fixed order:
//!   1. an unlabeled first column becomes the rank column
//!   2. columns ending in the ancillary-rank suffix are dropped (unless that
//!      would leave no columns at all)
//!   3. rows with no content are dropped
//!   4. rows that echo the header are dropped
//!   5. configured duplicate labels get positional names (`PTS`, `PTS` →
//!      `Away PTS`, `Home PTS`)
//!   6. remaining blank or repeated labels are made unique
//!
//! Rule 1 looks at whichever column is first once rule 2 has dropped its
//! columns, and rule 4 is checked again against the final labels.
//!
//! Running `normalize` on its own output changes nothing.

use crate::models::{Cell, NormalizedTable, RawTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeRules {
    pub rank_label: String,
    pub ancillary_suffix: String,
    pub duplicate_renames: Vec<DuplicateRename>,
}

/// Rename the occurrences of a repeated label by position, but only when the
/// label occurs exactly `variants.len()` times.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DuplicateRename {
    pub label: String,
    pub variants: Vec<String>,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self {
            rank_label: "RANK".to_string(),
            ancillary_suffix: "RANK".to_string(),
            duplicate_renames: Vec::new(),
        }
    }
}

pub fn normalize(table: RawTable, rules: &NormalizeRules) -> NormalizedTable {
    let RawTable { mut columns, mut rows } = table;
    let width = columns.len();
    for row in &mut rows {
        row.resize(width, None);
    }

    // 2
    let keep: Vec<usize> = (0..width)
        .filter(|&i| !is_ancillary_rank(&columns[i], rules))
        .collect();
    if keep.is_empty() {
        debug!("every column looks like an ancillary rank, keeping table as is");
    } else if keep.len() < width {
        columns = keep.iter().map(|&i| columns[i].clone()).collect();
        rows = rows
            .into_iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();
    }

    // 1
    if columns.first().is_some_and(|c| is_unlabeled(c)) {
        columns[0] = rules.rank_label.clone();
    }

    // 3 + 4
    let before = rows.len();
    rows.retain(|row| !is_blank_row(row) && !is_header_echo(row, &columns));
    if rows.len() < before {
        debug!("dropped {} blank/header rows", before - rows.len());
    }

    // 5
    for rename in &rules.duplicate_renames {
        apply_duplicate_rename(&mut columns, rename);
    }

    // 6
    make_unique(&mut columns);

    // 4, against the renamed labels
    let before = rows.len();
    rows.retain(|row| !is_header_echo(row, &columns));
    if rows.len() < before {
        debug!("dropped {} rows echoing renamed labels", before - rows.len());
    }

    NormalizedTable { columns, rows }
}

fn is_unlabeled(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label.starts_with("Unnamed:")
}

fn is_ancillary_rank(label: &str, rules: &NormalizeRules) -> bool {
    let label = label.trim();
    !rules.ancillary_suffix.is_empty()
        && label != rules.rank_label
        && label.ends_with(&rules.ancillary_suffix)
}

pub fn is_blank_cell(cell: &Cell) -> bool {
    cell.as_deref().is_none_or(|c| c.trim().is_empty())
}

pub fn is_blank_row(row: &[Cell]) -> bool {
    row.iter().all(is_blank_cell)
}

/// A body row that repeats the header: its first cell is the first label,
/// or every filled cell equals the label above it.
fn is_header_echo(row: &[Cell], columns: &[String]) -> bool {
    let same = |cell: &Cell, label: &String| {
        cell.as_deref().is_some_and(|c| c.trim() == label.trim())
    };

    if let (Some(first), Some(label)) = (row.first(), columns.first()) {
        if !label.trim().is_empty() && same(first, label) {
            return true;
        }
    }

    let mut filled = row.iter().zip(columns).filter(|(c, _)| !is_blank_cell(c)).peekable();
    filled.peek().is_some() && filled.all(|(c, l)| same(c, l))
}

fn apply_duplicate_rename(columns: &mut [String], rename: &DuplicateRename) {
    let positions: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.trim() == rename.label)
        .map(|(i, _)| i)
        .collect();

    if positions.len() != rename.variants.len() {
        if positions.len() > 1 {
            debug!(
                "`{}` occurs {} times, expected {}; leaving labels alone",
                rename.label,
                positions.len(),
                rename.variants.len()
            );
        }
        return;
    }

    for (pos, variant) in positions.into_iter().zip(&rename.variants) {
        columns[pos] = variant.clone();
    }
}

/// Blank labels become `Unnamed: <index>`; the n-th repeat of a label gets
/// `.n` appended.
fn make_unique(columns: &mut [String]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (i, label) in columns.iter_mut().enumerate() {
        if label.trim().is_empty() {
            *label = format!("Unnamed: {i}");
        }
        seen.entry(label.clone()).or_insert(0);
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for label in columns.iter_mut() {
        let n = counts.entry(label.clone()).or_insert(0);
        if *n > 0 {
            let mut candidate = format!("{label}.{n}");
            while seen.contains_key(&candidate) {
                *n += 1;
                candidate = format!("{label}.{n}");
            }
            seen.insert(candidate.clone(), 0);
            *n += 1;
            *label = candidate;
        } else {
            *n += 1;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn player_table() -> RawTable {
        table(
            &["", "PLAYER", "GP", "GP RANK", "PTS", "PTS RANK"],
            vec![
                vec![s("1"), s("Luka Dončić"), s("70"), s("12"), s("28.2"), s("2")],
                vec![None, None, None, None, None, None],
                vec![s("2"), s("Nikola Jokić"), s("74"), s("5"), s("29.6"), s("1")],
                vec![None, s("PLAYER"), s("GP"), s("GP RANK"), s("PTS"), s("PTS RANK")],
            ],
        )
    }

    #[test]
    fn test_rank_columns_and_noise_rows() {
        let out = normalize(player_table(), &NormalizeRules::default());

        assert_eq!(out.columns(), &["RANK", "PLAYER", "GP", "PTS"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[1], vec![s("2"), s("Nikola Jokić"), s("74"), s("29.6")]);
    }

    #[test]
    fn test_no_ancillary_rank_label_survives() {
        let rules = NormalizeRules::default();
        let out = normalize(player_table(), &rules);
        assert!(
            out.columns()
                .iter()
                .all(|c| c == "RANK" || !c.trim().ends_with(&rules.ancillary_suffix))
        );
        assert!(out.rows().iter().all(|r| !is_blank_row(r)));
    }

    #[test]
    fn test_all_rank_columns_kept_rather_than_emptied() {
        let t = table(&["W RANK", "L RANK"], vec![vec![s("3"), s("9")]]);
        let out = normalize(t, &NormalizeRules::default());
        assert_eq!(out.columns(), &["W RANK", "L RANK"]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let rules = NormalizeRules {
            duplicate_renames: vec![DuplicateRename {
                label: "PTS".into(),
                variants: vec!["Away PTS".into(), "Home PTS".into()],
            }],
            ..NormalizeRules::default()
        };
        let once = normalize(player_table(), &rules);
        let twice = normalize(once.clone().into_raw(), &rules);
        assert_eq!(once, twice);

        let sched = table(
            &["Date", "Visitor/Neutral", "PTS", "Home/Neutral", "PTS", "", "Notes"],
            vec![vec![s("Oct 21"), s("HOU"), s("120"), s("OKC"), s("125"), s("Box Score"), None]],
        );
        let once = normalize(sched, &rules);
        let twice = normalize(once.clone().into_raw(), &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_blank_column_after_dropped_rank_becomes_rank() {
        let rules = NormalizeRules::default();
        let t = table(
            &["GP RANK", "", "PLAYER"],
            vec![vec![s("4"), s("1"), s("Shai Gilgeous-Alexander")]],
        );

        let once = normalize(t, &rules);
        assert_eq!(once.columns(), &["RANK", "PLAYER"]);
        assert_eq!(once.rows()[0], vec![s("1"), s("Shai Gilgeous-Alexander")]);

        let twice = normalize(once.clone().into_raw(), &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_row_echoing_renamed_labels_is_dropped() {
        let rules = NormalizeRules {
            duplicate_renames: vec![DuplicateRename {
                label: "PTS".into(),
                variants: vec!["Away PTS".into(), "Home PTS".into()],
            }],
            ..NormalizeRules::default()
        };
        let t = table(
            &["PTS", "Team", "PTS"],
            vec![
                vec![s("Away PTS"), s("Team"), s("Home PTS")],
                vec![s("112"), s("Denver Nuggets"), s("104")],
            ],
        );

        let once = normalize(t, &rules);
        assert_eq!(once.columns(), &["Away PTS", "Team", "Home PTS"]);
        assert_eq!(once.len(), 1);
        assert_eq!(once.rows()[0][1], s("Denver Nuggets"));
        assert!(once.rows().iter().all(|r| r[0] != s("Away PTS")));

        let twice = normalize(once.clone().into_raw(), &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_duplicate_points_columns_by_position() {
        let rules = NormalizeRules {
            duplicate_renames: vec![DuplicateRename {
                label: "PTS".into(),
                variants: vec!["Away PTS".into(), "Home PTS".into()],
            }],
            ..NormalizeRules::default()
        };
        let sched = table(
            &["Date", "Visitor/Neutral", "PTS", "Home/Neutral", "PTS", "", "", "Attend."],
            vec![
                vec![s("Tue, Oct 21, 2025"), s("Houston Rockets"), s("124"), s("Oklahoma City Thunder"), s("125"), s("Box Score"), s("2OT"), s("18,203")],
                vec![s("Date"), s("Visitor/Neutral"), s("PTS"), s("Home/Neutral"), s("PTS"), None, None, s("Attend.")],
            ],
        );

        let out = normalize(sched, &rules);
        assert_eq!(
            out.columns(),
            &["Date", "Visitor/Neutral", "Away PTS", "Home/Neutral", "Home PTS", "Unnamed: 5", "Unnamed: 6", "Attend."]
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_rename_skipped_when_occurrences_disagree() {
        let rules = NormalizeRules {
            duplicate_renames: vec![DuplicateRename {
                label: "PTS".into(),
                variants: vec!["Away PTS".into(), "Home PTS".into()],
            }],
            ..NormalizeRules::default()
        };
        let t = table(&["Team", "PTS", "PTS", "PTS"], vec![vec![s("A"), s("1"), s("2"), s("3")]]);
        let out = normalize(t, &rules);
        assert_eq!(out.columns(), &["Team", "PTS", "PTS.1", "PTS.2"]);
    }

    #[test]
    fn test_make_unique_avoids_existing_suffix() {
        let mut cols: Vec<String> = ["A", "A.1", "A"].iter().map(|c| c.to_string()).collect();
        make_unique(&mut cols);
        assert_eq!(cols, vec!["A", "A.1", "A.2"]);
    }
}
