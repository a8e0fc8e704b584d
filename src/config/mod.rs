use crate::driver::Locator;
use crate::export::ExportFormat;
use crate::extract::normalize::{DuplicateRename, NormalizeRules};
use crate::navigator::walker::SEASON_MONTHS;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

/// WebDriver endpoint and browser session settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    pub webdriver_url: String,
    pub browser: String,
    pub headless: bool,
    pub browser_args: Vec<String>,
    pub page_load_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub user_agent: String,
}

/// Timeouts and delays handed to every pipeline invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub poll_interval_ms: u64,
    /// Required data tables.
    pub table_timeout_secs: u64,
    /// Optional chrome: consent banners, page-size dropdowns.
    pub chrome_timeout_secs: u64,
    pub consent_settle_ms: u64,
    pub expand_settle_ms: u64,
    pub navigation_settle_ms: u64,
    pub expand_attempts: u32,
    pub expand_backoff_ms: u64,
    pub page_delay_ms: u64,
    pub jitter_ms: u64,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sources running at once, each with its own browser session.
    pub concurrency: usize,
    pub output_dir: PathBuf,
    pub format: ExportFormat,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub db_path: PathBuf,
    pub run_migrations: bool,
}

// ── Sources ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    /// File name under `pipeline.output_dir`.
    pub output: String,
    /// Cookie banner to click away. Left out means the source has none.
    #[serde(default)]
    pub consent: Option<Locator>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// One table, optionally behind a "rows per page" dropdown.
    StatsTable {
        table: Locator,
        page_size: Option<Locator>,
        #[serde(default = "default_all_option")]
        all_option: String,
        #[serde(default)]
        normalize: NormalizeRules,
    },
    /// One table per month page, pages linked from a filter bar.
    MonthlySchedule {
        month_links: Locator,
        active_month: Option<Locator>,
        table: Locator,
        /// Lower-case month names in the order pages are visited.
        #[serde(default = "default_month_order")]
        month_order: Vec<String>,
        #[serde(default)]
        normalize: NormalizeRules,
    },
    /// Per-season pages, each holding conference sections whose team names
    /// and numbers live in two separate tables.
    SplitStandings {
        season_links: Locator,
        #[serde(default = "default_link_attribute")]
        link_attribute: String,
        /// `{value}` is replaced by the link attribute.
        url_template: Option<String>,
        active_season: Option<Locator>,
        max_seasons: Option<usize>,
        section: Locator,
        title_css: String,
        names_css: String,
        /// Inside each name row; when unset the first cell's text is used.
        name_cell_css: Option<String>,
        data_css: String,
        group_names: Vec<String>,
        #[serde(default = "default_name_label")]
        name_label: String,
        #[serde(default)]
        normalize: NormalizeRules,
    },
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::StatsTable { .. } => "stats_table",
            Self::MonthlySchedule { .. } => "monthly_schedule",
            Self::SplitStandings { .. } => "split_standings",
        }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_consent() -> Option<Locator> {
    Some(Locator::id("onetrust-accept-btn-handler"))
}
fn default_all_option() -> String {
    "-1".to_string()
}
fn default_month_order() -> Vec<String> {
    SEASON_MONTHS.iter().map(|m| m.to_string()).collect()
}
fn default_link_attribute() -> String {
    "href".to_string()
}
fn default_name_label() -> String {
    "Team".to_string()
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "players".into(),
            url: "https://www.nba.com/stats/players/traditional?Season=2025-26&SeasonType=Regular%20Season".into(),
            output: "nba_stats_2025_26_players.json".into(),
            consent: default_consent(),
            kind: SourceKind::StatsTable {
                table: Locator::css("div.nba-stat-table table"),
                page_size: Some(Locator::css("div.Pagination_pageDropdown__KgjBU select")),
                all_option: default_all_option(),
                normalize: NormalizeRules::default(),
            },
        },
        SourceConfig {
            name: "schedule".into(),
            url: "https://www.basketball-reference.com/leagues/NBA_2026_games.html".into(),
            output: "nba_2026_schedule.json".into(),
            consent: None,
            kind: SourceKind::MonthlySchedule {
                month_links: Locator::css("div.filter a"),
                active_month: Some(Locator::css("div.filter div.current")),
                table: Locator::css("table#schedule"),
                month_order: default_month_order(),
                normalize: NormalizeRules {
                    duplicate_renames: vec![DuplicateRename {
                        label: "PTS".into(),
                        variants: vec!["Away PTS".into(), "Home PTS".into()],
                    }],
                    ..NormalizeRules::default()
                },
            },
        },
        SourceConfig {
            name: "standings".into(),
            url: "https://www.espn.com/nba/standings/_/season/2026".into(),
            output: "nba_espn_standings_all_seasons.json".into(),
            consent: default_consent(),
            kind: SourceKind::SplitStandings {
                season_links: Locator::css("select.dropdown__select option"),
                link_attribute: "value".into(),
                url_template: Some("https://www.espn.com/nba/standings/_/season/{value}".into()),
                active_season: Some(Locator::css("select.dropdown__select option[selected]")),
                max_seasons: None,
                section: Locator::css("div.standings__table"),
                title_css: "div.Table__Title".into(),
                names_css: "table.Table--fixed-left".into(),
                name_cell_css: Some("span.hide-mobile".into()),
                data_css: "div.Table__Scroller table".into(),
                group_names: vec!["Eastern".into(), "Western".into()],
                name_label: default_name_label(),
                normalize: NormalizeRules::default(),
            },
        },
    ]
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            browser: "chrome".into(),
            headless: true,
            browser_args: vec!["--no-sandbox".into(), "--disable-dev-shm-usage".into()],
            page_load_timeout_secs: 60,
            request_timeout_secs: 90,
            max_retries: 3,
            retry_base_ms: 100,
            user_agent: "courtside-etl/0.1 (stats research)".into(),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            table_timeout_secs: 20,
            chrome_timeout_secs: 10,
            consent_settle_ms: 1000,
            expand_settle_ms: 3000,
            navigation_settle_ms: 2000,
            expand_attempts: 3,
            expand_backoff_ms: 1000,
            page_delay_ms: 1000,
            jitter_ms: 500,
        }
    }
}

impl ExtractionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn table_timeout(&self) -> Duration {
        Duration::from_secs(self.table_timeout_secs)
    }
    pub fn chrome_timeout(&self) -> Duration {
        Duration::from_secs(self.chrome_timeout_secs)
    }
    pub fn consent_settle(&self) -> Duration {
        Duration::from_millis(self.consent_settle_ms)
    }
    pub fn expand_settle(&self) -> Duration {
        Duration::from_millis(self.expand_settle_ms)
    }
    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }
    pub fn expand_backoff(&self) -> Duration {
        Duration::from_millis(self.expand_backoff_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            output_dir: PathBuf::from("data"),
            format: ExportFormat::Json,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from("data/courtside.duckdb"),
            run_migrations: true,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("COURTSIDE").separator("__"))
            .build()?;

        let app_cfg = match cfg.try_deserialize::<AppConfig>() {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid configuration ({}), falling back to defaults", e);
                AppConfig::default()
            }
        };
        Ok(app_cfg)
    }

    /// Sources to run: all of them, or only the named ones.
    pub fn selected_sources(&self, names: &[String]) -> Vec<SourceConfig> {
        self.sources
            .iter()
            .filter(|s| names.is_empty() || names.iter().any(|n| n == &s.name))
            .cloned()
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            extraction: ExtractionSettings::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            sources: default_sources(),
        }
    }
}
