//! Discovering and visiting the sub-pages of one logical dataset: the
//! months of a schedule, the seasons of a standings archive.

use crate::config::ExtractionSettings;
use crate::driver::{ElementHandle, Locator, PageDriver};
use crate::errors::ExtractError;
use crate::utils::capitalize;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// Calendar order of an NBA season.
pub const SEASON_MONTHS: [&str; 9] = [
    "october", "november", "december", "january", "february", "march", "april", "may", "june",
];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]+").unwrap());
static SEASON_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:19|20)\d{2})\s*[-/–]\s*(\d{2,4})").unwrap());
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:19|20)\d{2}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPage {
    pub label: String,
    pub url: String,
}

// ── Months ────────────────────────────────────────────────────────────────────

/// Month-page enumeration config.
#[derive(Debug, Clone)]
pub struct MonthWalker<'a> {
    pub links: &'a Locator,
    pub active: Option<&'a Locator>,
    pub order: &'a [String],
}

impl MonthWalker<'_> {
    /// Month pages in season order, the current page included. Pages whose
    /// month cannot be recognised go last, labelled by their file name.
    pub async fn enumerate<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
    ) -> Result<Vec<SubPage>, ExtractError> {
        let current = driver.current_location().await?;
        let links = collect_links(driver, self.links, "href", None, &current).await?;

        let mut pages: Vec<SubPage> = links
            .into_iter()
            .map(|(url, text)| {
                let label = month_label(&url, self.order)
                    .or_else(|| text.as_deref().and_then(|t| month_label(t, self.order)))
                    .unwrap_or_else(|| page_stem(&url));
                SubPage { label, url }
            })
            .collect();

        if !pages.iter().any(|p| p.url == current) {
            let mut label = month_label(&current, self.order);
            if label.is_none() {
                if let Some(active) = self.active {
                    label = active_text(driver, active)
                        .await
                        .and_then(|t| month_label(&t, self.order));
                }
            }
            match label {
                Some(l) if pages.iter().any(|p| p.label == l) => {
                    debug!("current page is the {} page under another URL", l)
                }
                Some(l) => pages.push(SubPage { label: l, url: current }),
                None => pages.push(SubPage { label: page_stem(&current), url: current }),
            }
        }

        order_months(&mut pages, self.order);
        info!(
            "{} month pages: {}",
            pages.len(),
            pages.iter().map(|p| p.label.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(pages)
    }
}

/// Stable sort by position in `order`; unknown labels after all known ones.
pub fn order_months(pages: &mut [SubPage], order: &[String]) {
    pages.sort_by_key(|p| month_index(&p.label, order).unwrap_or(usize::MAX));
}

fn month_index(token: &str, order: &[String]) -> Option<usize> {
    let token = token.to_lowercase();
    order.iter().position(|m| m.to_lowercase() == token)
}

/// Capitalised month name found as a word in `text` (URL or UI label).
pub fn month_label(text: &str, order: &[String]) -> Option<String> {
    WORD.find_iter(text)
        .find_map(|w| month_index(w.as_str(), order).map(|i| capitalize(&order[i])))
}

// ── Seasons ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SeasonWalker<'a> {
    pub links: &'a Locator,
    pub attribute: &'a str,
    pub url_template: Option<&'a str>,
    pub active: Option<&'a Locator>,
    pub max_seasons: Option<usize>,
}

impl SeasonWalker<'_> {
    /// Season pages oldest first, the current page included. With
    /// `max_seasons`, only the most recent ones are kept.
    pub async fn enumerate<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
    ) -> Result<Vec<SubPage>, ExtractError> {
        let current = driver.current_location().await?;
        let links =
            collect_links(driver, self.links, self.attribute, self.url_template, &current).await?;

        let mut pages: Vec<SubPage> = Vec::new();
        for (url, text) in links {
            let label = season_label(&url).or_else(|| text.as_deref().and_then(season_label));
            match label {
                Some(label) => pages.push(SubPage { label, url }),
                None => warn!("No season in {} ({:?}), skipping", url, text),
            }
        }

        if !pages.iter().any(|p| p.url == current) {
            let mut label = season_label(&current);
            if label.is_none() {
                if let Some(active) = self.active {
                    label = active_text(driver, active)
                        .await
                        .and_then(|t| season_label(&t));
                }
            }
            match label {
                Some(l) if pages.iter().any(|p| p.label == l) => {}
                Some(l) => pages.push(SubPage { label: l, url: current }),
                None => warn!("Could not tell which season {} shows", current),
            }
        }

        let mut seen = HashSet::new();
        pages.retain(|p| seen.insert(p.label.clone()));
        pages.sort_by(|a, b| a.label.cmp(&b.label));

        if let Some(max) = self.max_seasons {
            let skip = pages.len().saturating_sub(max);
            pages.drain(..skip);
        }

        info!(
            "{} seasons: {}",
            pages.len(),
            pages.iter().map(|p| p.label.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(pages)
    }
}

/// `YYYY-YY` for the season named in `text`.
///
/// An explicit range (`2024-25`, `2024/2025`) is taken as written; a lone
/// year is the year the season ends in, so `2025` → `2024-25`.
pub fn season_label(text: &str) -> Option<String> {
    if let Some(caps) = SEASON_RANGE.captures(text) {
        let start: u32 = caps[1].parse().ok()?;
        let end: u32 = caps[2].parse().ok()?;
        if end % 100 == (start + 1) % 100 {
            return Some(format_season(start + 1));
        }
    }
    let year: u32 = YEAR.find_iter(text).last()?.as_str().parse().ok()?;
    Some(format_season(year))
}

fn format_season(end_year: u32) -> String {
    format!("{}-{:02}", end_year - 1, end_year % 100)
}

// ── Shared ────────────────────────────────────────────────────────────────────

/// Distinct absolute targets of the links at `locator`, with link text.
async fn collect_links<D: PageDriver + ?Sized>(
    driver: &mut D,
    locator: &Locator,
    attribute: &str,
    template: Option<&str>,
    current: &str,
) -> Result<Vec<(String, Option<String>)>, ExtractError> {
    let base = Url::parse(current).ok();
    let elements = driver.find_all(locator).await?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for el in elements {
        let raw = match driver.read_attribute(&el, attribute).await {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => continue,
            Err(e) if e.is_transient() => {
                debug!("link under {} went away: {}", locator, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let Some(url) = resolve(raw.trim(), template, base.as_ref()) else {
            debug!("unresolvable link {:?}", raw);
            continue;
        };
        if seen.insert(url.clone()) {
            let text = driver.read_text(&el).await.ok().filter(|t| !t.trim().is_empty());
            links.push((url, text));
        }
    }
    Ok(links)
}

fn resolve(raw: &str, template: Option<&str>, base: Option<&Url>) -> Option<String> {
    let target = match template {
        Some(t) => t.replace("{value}", raw),
        None => raw.to_string(),
    };
    match Url::parse(&target) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base?.join(&target).ok().map(|u| u.to_string()),
    }
}

async fn active_text<D: PageDriver + ?Sized>(driver: &mut D, active: &Locator) -> Option<String> {
    let el: ElementHandle = driver.find(active).await.ok().flatten()?;
    driver.read_text(&el).await.ok()
}

fn page_stem(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let last = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url);
    last.split('.').next().unwrap_or(last).to_string()
}

/// Go to `page` unless we are already there. Returns whether it navigated.
///
/// A polite delay with jitter precedes every real navigation and a settle
/// delay follows it.
pub async fn visit<D: PageDriver + ?Sized>(
    driver: &mut D,
    page: &SubPage,
    settings: &ExtractionSettings,
) -> Result<bool, ExtractError> {
    if driver.current_location().await? == page.url {
        debug!("Already on {} ({})", page.label, page.url);
        return Ok(false);
    }

    let jitter = if settings.jitter_ms > 0 {
        rand::random_range(0..=settings.jitter_ms)
    } else {
        0
    };
    sleep(Duration::from_millis(settings.page_delay_ms + jitter)).await;

    info!("Navigating to {} ({})", page.label, page.url);
    driver
        .navigate(&page.url)
        .await
        .map_err(|source| ExtractError::Navigation {
            url: page.url.clone(),
            source,
        })?;
    sleep(settings.navigation_settle()).await;
    Ok(true)
}
