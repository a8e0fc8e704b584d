//! The page driver capability every extraction step runs against.
//!
//! Rendering is somebody else's job: a driver can load a URL, hand out
//! element handles for a locator, read markup back and poke at controls.
//! The one production implementation speaks W3C WebDriver; tests use a
//! scripted in-memory page.

pub mod webdriver;

#[cfg(test)]
pub mod fake;

use crate::errors::DriverError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub use self::webdriver::WebDriverClient;

// ── Locators & handles ────────────────────────────────────────────────────────

/// How to find an element. Opaque to everything above the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Id(String),
    Css(String),
    Xpath(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Css(css) => f.write_str(css),
            Self::Xpath(xpath) => write!(f, "xpath:{xpath}"),
        }
    }
}

/// Driver-issued reference to a rendered element. It goes stale whenever
/// the page re-renders underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

// ── Driver trait ──────────────────────────────────────────────────────────────

/// Exclusive handle on one browser page. Methods take `&mut self`: whoever
/// drives the page owns it, and navigation invalidates everything read
/// before it.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn current_location(&mut self) -> Result<String, DriverError>;

    /// `Ok(None)` when nothing matches right now.
    async fn find(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, DriverError>;

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError>;

    /// Rendered outer HTML of the element.
    async fn read_markup(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn read_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    /// Displayed and enabled.
    async fn is_interactable(&mut self, element: &ElementHandle) -> Result<bool, DriverError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn select_option(&mut self, element: &ElementHandle, value: &str)
    -> Result<(), DriverError>;

    async fn page_source(&mut self) -> Result<String, DriverError>;

    async fn run_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value, DriverError>;

    /// Release the underlying browser session.
    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_from_toml_shape() {
        let loc: Locator = serde_json::from_str(r#"{"css": "table#schedule"}"#).unwrap();
        assert_eq!(loc, Locator::css("table#schedule"));
        assert_eq!(Locator::id("onetrust-accept-btn-handler").to_string(), "#onetrust-accept-btn-handler");
    }
}
