//! Per-source driving loops. Each page or section is one unit of work:
//! its failure is recorded and the loop moves on to the next one.

use super::accumulator::RecordAccumulator;
use crate::config::{ExtractionSettings, SourceConfig, SourceKind};
use crate::driver::{ElementHandle, Locator, PageDriver};
use crate::errors::ExtractError;
use crate::extract::parsers::{parse_labels, parse_tables_in, select_text};
use crate::extract::{NormalizeRules, align, extract_element, extract_page, first_table, normalize};
use crate::models::{DatasetResult, NormalizedTable, Provenance};
use crate::navigator::{
    ConsentOutcome, ExpandOutcome, MonthWalker, SeasonWalker, SubPage, WaitPolicy,
    dismiss_if_present, expand_to_all, visit,
};
use tracing::{info, warn};

#[derive(Debug)]
pub struct UnitFailure {
    pub unit: String,
    pub error: ExtractError,
}

/// Outcome of one source: whatever records were collected plus the units
/// that had to be skipped.
#[derive(Debug)]
pub struct SourceReport {
    pub name: String,
    pub dataset: DatasetResult,
    pub failures: Vec<UnitFailure>,
    /// `None` when the source has no consent locator.
    pub consent: Option<ConsentOutcome>,
    /// `None` when the source has no page-size control.
    pub expansion: Option<ExpandOutcome>,
}

impl SourceReport {
    /// A source only fails as a whole when nothing came out of it.
    pub fn is_failed(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Records came out, but only the default page of rows was rendered.
    pub fn is_partial(&self) -> bool {
        self.expansion == Some(ExpandOutcome::PartiallyExpanded)
    }
}

struct SourceRun {
    name: String,
    records: RecordAccumulator,
    failures: Vec<UnitFailure>,
    consent: Option<ConsentOutcome>,
    expansion: Option<ExpandOutcome>,
}

impl SourceRun {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: RecordAccumulator::new(name),
            failures: Vec::new(),
            consent: None,
            expansion: None,
        }
    }

    fn fail(&mut self, unit: impl Into<String>, error: ExtractError) {
        let unit = unit.into();
        warn!("[{}] skipping {}: {}", self.name, unit, error);
        self.failures.push(UnitFailure { unit, error });
    }

    fn finish(self) -> SourceReport {
        SourceReport {
            name: self.name,
            dataset: self.records.finish(),
            failures: self.failures,
            consent: self.consent,
            expansion: self.expansion,
        }
    }
}

/// Drive one configured source to completion on `driver`.
pub async fn run_source<D: PageDriver + ?Sized>(
    driver: &mut D,
    source: &SourceConfig,
    settings: &ExtractionSettings,
) -> SourceReport {
    let mut run = SourceRun::new(&source.name);
    info!("[{}] {} at {}", source.name, source.kind.label(), source.url);

    let entry = SubPage {
        label: source.name.clone(),
        url: source.url.clone(),
    };
    if let Err(e) = visit(driver, &entry, settings).await {
        run.fail(&source.url, e);
        return run.finish();
    }

    if let Some(consent) = &source.consent {
        run.consent = Some(dismiss_if_present(driver, consent, settings).await);
    }

    match &source.kind {
        SourceKind::StatsTable {
            table,
            page_size,
            all_option,
            normalize: rules,
        } => {
            if let Some(control) = page_size {
                let outcome = expand_to_all(driver, control, all_option, settings).await;
                if outcome == ExpandOutcome::PartiallyExpanded {
                    warn!(
                        "[{}] \"{}\" not selected, only the default rows are kept",
                        source.name, all_option
                    );
                }
                run.expansion = Some(outcome);
            }
            match scrape_stats_table(driver, table, rules, settings).await {
                Ok(table) => {
                    run.records.append(&table, &Provenance::none());
                }
                Err(e) => run.fail(&source.url, e),
            }
        }

        SourceKind::MonthlySchedule {
            month_links,
            active_month,
            table,
            month_order,
            normalize: rules,
        } => {
            let walker = MonthWalker {
                links: month_links,
                active: active_month.as_ref(),
                order: month_order,
            };
            let pages = match walker.enumerate(driver).await {
                Ok(pages) => pages,
                Err(e) => {
                    run.fail("month links", e);
                    return run.finish();
                }
            };

            for page in &pages {
                match scrape_month(driver, page, table, rules, settings).await {
                    Ok(rows) => {
                        run.records
                            .append(&rows, &Provenance::none().with("Month", &page.label));
                    }
                    Err(e) => run.fail(&page.label, e),
                }
            }
        }

        SourceKind::SplitStandings {
            season_links,
            link_attribute,
            url_template,
            active_season,
            max_seasons,
            section,
            title_css,
            names_css,
            name_cell_css,
            data_css,
            group_names,
            name_label,
            normalize: rules,
        } => {
            let walker = SeasonWalker {
                links: season_links,
                attribute: link_attribute,
                url_template: url_template.as_deref(),
                active: active_season.as_ref(),
                max_seasons: *max_seasons,
            };
            let seasons = match walker.enumerate(driver).await {
                Ok(seasons) => seasons,
                Err(e) => {
                    run.fail("season links", e);
                    return run.finish();
                }
            };

            let layout = SectionLayout {
                title_css,
                names_css,
                name_cell_css: name_cell_css.as_deref(),
                data_css,
                group_names,
                name_label,
                rules,
            };
            for season in &seasons {
                let sections = match open_season(driver, season, section, settings).await {
                    Ok(sections) => sections,
                    Err(e) => {
                        run.fail(&season.label, e);
                        continue;
                    }
                };

                for (idx, el) in sections.iter().enumerate() {
                    match scrape_section(driver, el, idx, &layout).await {
                        Ok((conference, rows)) => {
                            let provenance = Provenance::none()
                                .with("Season", &season.label)
                                .with("Conference", conference);
                            run.records.append(&rows, &provenance);
                        }
                        Err(e) => run.fail(format!("{} section {}", season.label, idx + 1), e),
                    }
                }
            }
        }
    }

    let report = run.finish();
    info!(
        "[{}] {} records, {} skipped units{}",
        report.name,
        report.dataset.len(),
        report.failures.len(),
        if report.is_partial() { ", partial" } else { "" }
    );
    report
}

async fn scrape_stats_table<D: PageDriver + ?Sized>(
    driver: &mut D,
    table: &Locator,
    rules: &NormalizeRules,
    settings: &ExtractionSettings,
) -> Result<NormalizedTable, ExtractError> {
    WaitPolicy::from_settings(settings)
        .present(driver, table, settings.table_timeout())
        .await?;
    let raw = first_table(extract_page(driver).await?, &table.to_string())?;
    Ok(normalize(raw, rules))
}

async fn scrape_month<D: PageDriver + ?Sized>(
    driver: &mut D,
    page: &SubPage,
    table: &Locator,
    rules: &NormalizeRules,
    settings: &ExtractionSettings,
) -> Result<NormalizedTable, ExtractError> {
    visit(driver, page, settings).await?;
    let el = WaitPolicy::from_settings(settings)
        .present(driver, table, settings.table_timeout())
        .await?;
    let raw = first_table(
        extract_element(driver, &el).await?,
        &format!("{} ({})", table, page.label),
    )?;
    Ok(normalize(raw, rules))
}

async fn open_season<D: PageDriver + ?Sized>(
    driver: &mut D,
    season: &SubPage,
    section: &Locator,
    settings: &ExtractionSettings,
) -> Result<Vec<ElementHandle>, ExtractError> {
    visit(driver, season, settings).await?;
    WaitPolicy::from_settings(settings)
        .present(driver, section, settings.table_timeout())
        .await?;
    Ok(driver.find_all(section).await?)
}

struct SectionLayout<'a> {
    title_css: &'a str,
    names_css: &'a str,
    name_cell_css: Option<&'a str>,
    data_css: &'a str,
    group_names: &'a [String],
    name_label: &'a str,
    rules: &'a NormalizeRules,
}

/// One conference block: its label and the merged name + data table.
async fn scrape_section<D: PageDriver + ?Sized>(
    driver: &mut D,
    section: &ElementHandle,
    idx: usize,
    layout: &SectionLayout<'_>,
) -> Result<(String, NormalizedTable), ExtractError> {
    let markup = driver.read_markup(section).await?;

    let title = select_text(&markup, layout.title_css)?;
    let (header, names) = parse_labels(&markup, layout.names_css, layout.name_cell_css)?;
    let conference = section_label(title.or(header).as_deref(), layout.group_names, idx);

    let data = first_table(
        parse_tables_in(&markup, layout.data_css)?,
        &format!("{} ({})", layout.data_css, conference),
    )?;
    let aligned = align(names, data, layout.group_names)?;
    let table = normalize(aligned.into_table(layout.name_label), layout.rules);
    Ok((conference, table))
}

/// The configured group name the heading mentions, else the heading itself.
fn section_label(heading: Option<&str>, groups: &[String], idx: usize) -> String {
    let Some(heading) = heading else {
        return format!("Section {}", idx + 1);
    };
    let lower = heading.to_lowercase();
    groups
        .iter()
        .find(|g| lower.contains(&g.to_lowercase()))
        .cloned()
        .unwrap_or_else(|| heading.to_string())
}
