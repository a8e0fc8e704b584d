pub mod align;
pub mod normalize;
pub mod parsers;

use crate::driver::{ElementHandle, PageDriver};
use crate::errors::ExtractError;
use crate::models::RawTable;
use tracing::debug;

pub use self::align::align;
pub use self::normalize::{NormalizeRules, normalize};

// ── Table extraction ──────────────────────────────────────────────────────────

/// All tables on the current page, document order. Pages carry incidental
/// tables too; the data table is normally the first one.
pub async fn extract_page<D: PageDriver + ?Sized>(
    driver: &mut D,
) -> Result<Vec<RawTable>, ExtractError> {
    let html = driver.page_source().await?;
    let tables = parsers::parse_tables(&html)?;
    debug!("page source: {} bytes, {} tables", html.len(), tables.len());
    Ok(tables)
}

/// Tables inside (or equal to) one located element.
pub async fn extract_element<D: PageDriver + ?Sized>(
    driver: &mut D,
    element: &ElementHandle,
) -> Result<Vec<RawTable>, ExtractError> {
    let markup = driver.read_markup(element).await?;
    parsers::parse_tables(&markup)
}

/// The first table, or `ExtractionEmpty` naming where we looked.
pub fn first_table(tables: Vec<RawTable>, context: &str) -> Result<RawTable, ExtractError> {
    tables
        .into_iter()
        .next()
        .ok_or_else(|| ExtractError::ExtractionEmpty(context.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Locator;
    use crate::driver::fake::{FakeDriver, FakeElement, FakePage};

    const URL: &str = "https://stats.example.com/players";

    #[tokio::test]
    async fn test_extract_page_returns_tables_in_order() {
        let page = FakePage::new()
            .with(
                Locator::css("div.nba-stat-table table"),
                FakeElement::html("<table><tr><th>PLAYER</th></tr><tr><td>A</td></tr></table>"),
            )
            .with(
                Locator::css("table.footer"),
                FakeElement::html("<table class=\"footer\"><tr><td>x</td></tr></table>"),
            );
        let mut driver = FakeDriver::new(URL).page(URL, page);

        let tables = extract_page(&mut driver).await.unwrap();
        assert_eq!(tables.len(), 2);
        let first = first_table(tables, URL).unwrap();
        assert_eq!(first.columns, vec!["PLAYER"]);
    }

    #[tokio::test]
    async fn test_extract_element_and_empty_context() {
        let loc = Locator::css("table#schedule");
        let page = FakePage::new().with(loc.clone(), FakeElement::html("<div>no table</div>"));
        let mut driver = FakeDriver::new(URL).page(URL, page);

        let el = driver.find(&loc).await.unwrap().unwrap();
        let tables = extract_element(&mut driver, &el).await.unwrap();
        let err = first_table(tables, "table#schedule").unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionEmpty(ctx) if ctx == "table#schedule"));
    }
}
