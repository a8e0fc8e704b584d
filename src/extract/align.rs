use super::normalize::{is_blank_cell, is_blank_row};
use crate::errors::AlignmentError;
use crate::models::{AlignedRowSet, Cell, RawTable};
use tracing::debug;

/// Pair a pinned label column with the data rows rendered next to it.
///
/// Group headings (any label containing one of `group_names`, ignoring
/// case) are removed from the labels first. Equal lengths zip directly;
/// otherwise blank labels and blank data rows are dropped on both sides and
/// the lengths compared again. A mismatch after that is an error: a
/// shifted pairing would put every team next to someone else's numbers.
pub fn align(
    names: Vec<Cell>,
    mut data: RawTable,
    group_names: &[String],
) -> Result<AlignedRowSet, AlignmentError> {
    let groups: Vec<String> = group_names.iter().map(|g| g.to_lowercase()).collect();
    let mut names: Vec<Cell> = names
        .into_iter()
        .filter(|name| !is_group_heading(name, &groups))
        .collect();

    if names.len() != data.rows.len() {
        debug!(
            "split table: {} names vs {} rows, dropping blanks",
            names.len(),
            data.rows.len()
        );
        names.retain(|n| !is_blank_cell(n));
        data.rows.retain(|r| !is_blank_row(r));
    }

    if names.len() != data.rows.len() {
        let names: Vec<String> = names.into_iter().map(Option::unwrap_or_default).collect();
        return Err(AlignmentError {
            names_len: names.len(),
            rows_len: data.rows.len(),
            names,
        });
    }

    Ok(AlignedRowSet {
        names: names.into_iter().map(Option::unwrap_or_default).collect(),
        data,
    })
}

fn is_group_heading(name: &Cell, groups: &[String]) -> bool {
    name.as_deref().is_some_and(|n| {
        let n = n.to_lowercase();
        groups.iter().any(|g| !g.is_empty() && n.contains(g.as_str()))
    })
}
