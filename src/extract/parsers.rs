use crate::errors::ExtractError;
use crate::models::{Cell, RawTable};
use crate::utils::collapse_whitespace;
use scraper::{ElementRef, Html, Selector};

// ── Selectors ─────────────────────────────────────────────────────────────────

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector(format!("{css}: {e:?}")))
}

struct TableSelectors {
    table: Selector,
    thead: Selector,
    tbody: Selector,
    tr: Selector,
}

impl TableSelectors {
    fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            table: selector("table")?,
            thead: selector("thead")?,
            tbody: selector("tbody")?,
            tr: selector("tr")?,
        })
    }
}

// ── Public entry points ───────────────────────────────────────────────────────

/// Every `<table>` in the markup, in document order. Nested tables come out
/// as tables of their own and do not leak rows into their parent.
pub fn parse_tables(markup: &str) -> Result<Vec<RawTable>, ExtractError> {
    let sels = TableSelectors::new()?;
    let doc = Html::parse_document(markup);
    Ok(doc
        .select(&sels.table)
        .filter_map(|table| parse_table(table, &sels))
        .collect())
}

/// Tables under the elements matching `css` (or those elements themselves
/// when they are tables).
pub fn parse_tables_in(markup: &str, css: &str) -> Result<Vec<RawTable>, ExtractError> {
    let sels = TableSelectors::new()?;
    let scope = selector(css)?;
    let doc = Html::parse_document(markup);

    let mut tables = Vec::new();
    for el in doc.select(&scope) {
        if el.value().name() == "table" {
            tables.extend(parse_table(el, &sels));
        } else {
            tables.extend(el.select(&sels.table).filter_map(|t| parse_table(t, &sels)));
        }
    }
    Ok(tables)
}

/// Header text and per-row labels of the first table matching `table_css`.
///
/// With `cell_css`, each label is the text of the first match inside the
/// row, which lets callers skip rank badges and abbreviations that share
/// the cell with the name.
pub fn parse_labels(
    markup: &str,
    table_css: &str,
    cell_css: Option<&str>,
) -> Result<(Option<String>, Vec<Cell>), ExtractError> {
    let sels = TableSelectors::new()?;
    let table_sel = selector(table_css)?;
    let cell_sel = cell_css.map(selector).transpose()?;
    let doc = Html::parse_document(markup);

    let Some(scope) = doc.select(&table_sel).next() else {
        return Err(ExtractError::ExtractionEmpty(format!("label table `{table_css}`")));
    };
    let table = if scope.value().name() == "table" {
        scope
    } else {
        scope
            .select(&sels.table)
            .next()
            .ok_or_else(|| ExtractError::ExtractionEmpty(format!("label table `{table_css}`")))?
    };

    let (header_rows, body_rows) = split_rows(table, &sels);
    let header = header_rows
        .iter()
        .flat_map(|row| row_cells(*row))
        .find_map(|cell| non_empty(text_of(cell)));

    let labels = body_rows
        .into_iter()
        .map(|row| match &cell_sel {
            Some(sel) => row
                .select(sel)
                .next()
                .and_then(|el| non_empty(text_of(el)))
                .or_else(|| non_empty(text_of(row))),
            None => row_cells(row).next().and_then(|c| non_empty(text_of(c))),
        })
        .collect();

    Ok((header, labels))
}

/// Trimmed text of the first element matching `css`.
pub fn select_text(markup: &str, css: &str) -> Result<Option<String>, ExtractError> {
    let sel = selector(css)?;
    let doc = Html::parse_document(markup);
    Ok(doc.select(&sel).next().and_then(|el| non_empty(text_of(el))))
}

// ── Table internals ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SpanCell {
    text: Cell,
    colspan: usize,
    rowspan: usize,
}

fn parse_table(table: ElementRef<'_>, sels: &TableSelectors) -> Option<RawTable> {
    let (header_rows, body_rows) = split_rows(table, sels);

    let header_grid = expand_spans(header_rows.iter().map(|r| span_cells(*r)).collect());
    let body = expand_spans(body_rows.iter().map(|r| span_cells(*r)).collect());

    let width = header_grid
        .iter()
        .chain(body.iter())
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    if width == 0 {
        return None;
    }

    let columns = (0..width)
        .map(|col| collapse_header(&header_grid, col))
        .collect();

    let rows = body
        .into_iter()
        .filter(|row| !row.is_empty())
        .map(|mut row| {
            row.resize(width, None);
            row
        })
        .collect();

    Some(RawTable::new(columns, rows))
}

/// Header rows: `<thead>` when present, otherwise leading all-`<th>` rows.
fn split_rows<'a>(
    table: ElementRef<'a>,
    sels: &TableSelectors,
) -> (Vec<ElementRef<'a>>, Vec<ElementRef<'a>>) {
    let mut own_rows: Vec<ElementRef<'a>> = table
        .select(&sels.tr)
        .filter(|tr| owned_by(*tr, table))
        .collect();

    let in_section = |tr: &ElementRef<'a>, sel: &Selector| {
        tr.parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|p| sel.matches(&p))
    };

    if table.select(&sels.thead).next().is_some() {
        let (head, rest): (Vec<_>, Vec<_>) =
            own_rows.into_iter().partition(|tr| in_section(tr, &sels.thead));
        let has_tbody = rest.iter().any(|tr| in_section(tr, &sels.tbody));
        let body = rest
            .into_iter()
            .filter(|tr| !has_tbody || in_section(tr, &sels.tbody))
            .collect();
        return (head, body);
    }

    let leading = own_rows
        .iter()
        .take_while(|tr| {
            let mut cells = row_cells(**tr).peekable();
            cells.peek().is_some() && cells.all(|c| c.value().name() == "th")
        })
        .count();
    let body = own_rows.split_off(leading);
    (own_rows, body)
}

/// The nearest enclosing `<table>` of `tr` is `table` itself.
fn owned_by(tr: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    tr.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
        .is_some_and(|el| el.id() == table.id())
}

fn row_cells<'a>(tr: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
}

fn span_cells(tr: ElementRef<'_>) -> Vec<SpanCell> {
    row_cells(tr)
        .map(|cell| SpanCell {
            text: non_empty(text_of(cell)),
            colspan: span_attr(cell, "colspan"),
            rowspan: span_attr(cell, "rowspan"),
        })
        .collect()
}

fn span_attr(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, 1000)
}

/// Lay span cells out on a rectangular grid, repeating a spanned value in
/// every slot it covers.
fn expand_spans(rows: Vec<Vec<SpanCell>>) -> Vec<Vec<Cell>> {
    // per column: value still hanging down and rows left to cover
    let mut pending: Vec<Option<(Cell, usize)>> = Vec::new();
    let mut grid = Vec::with_capacity(rows.len());

    for row in rows {
        let mut line: Vec<Cell> = Vec::new();
        let mut cells = row.into_iter().peekable();
        let mut col = 0;

        loop {
            if let Some(Some((value, left))) = pending.get_mut(col) {
                line.push(value.clone());
                *left -= 1;
                if *left == 0 {
                    pending[col] = None;
                }
                col += 1;
                continue;
            }

            match cells.next() {
                Some(cell) => {
                    for _ in 0..cell.colspan {
                        if pending.len() <= col {
                            pending.resize(col + 1, None);
                        }
                        if cell.rowspan > 1 {
                            pending[col] = Some((cell.text.clone(), cell.rowspan - 1));
                        }
                        line.push(cell.text.clone());
                        col += 1;
                    }
                }
                None => {
                    let more_below = pending.iter().skip(col).any(Option::is_some);
                    if !more_below {
                        break;
                    }
                    line.push(None);
                    col += 1;
                }
            }
        }

        grid.push(line);
    }

    grid
}

/// Join the distinct header segments stacked above one column.
fn collapse_header(header_grid: &[Vec<Cell>], col: usize) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for row in header_grid {
        if let Some(Some(text)) = row.get(col) {
            if parts.last() != Some(&text.as_str()) {
                parts.push(text.as_str());
            }
        }
    }
    parts.join(" ")
}

fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn non_empty(s: String) -> Cell {
    if s.is_empty() { None } else { Some(s) }
}
