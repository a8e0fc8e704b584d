use std::time::Duration;
use thiserror::Error;

/// Failures reported by the page driver itself.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("webdriver transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webdriver error `{code}`: {message}")]
    Protocol { code: String, message: String },

    #[error("unexpected webdriver response: {0}")]
    Malformed(String),
}

impl DriverError {
    /// Errors a polling wait may swallow and try again on.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StaleElement(_) | Self::NoSuchElement(_))
    }
}

/// The skip-or-continue taxonomy of a single unit of work (page, section,
/// source). Every variant except `Driver` is recoverable at the loop above.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("element went stale: {0}")]
    StaleReference(String),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("failed to navigate to {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("no table found in {0}")]
    ExtractionEmpty(String),

    #[error("invalid CSS selector {0}")]
    Selector(String),

    #[error(transparent)]
    Driver(DriverError),
}

impl From<DriverError> for ExtractError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::StaleElement(what) => Self::StaleReference(what),
            other => Self::Driver(other),
        }
    }
}

/// Name column and data block could not be paired row for row.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("split table mismatch: {names_len} names vs {rows_len} data rows (names: {names:?})")]
pub struct AlignmentError {
    pub names_len: usize,
    pub rows_len: usize,
    pub names: Vec<String>,
}
