//! Scripted in-memory page for tests.

use super::{ElementHandle, Locator, PageDriver};
use crate::errors::DriverError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub markup: String,
    pub text: String,
    pub attributes: HashMap<String, String>,
    /// Not findable until this long after the page loaded.
    pub appears_after: Duration,
    pub hidden: bool,
    /// Number of interactions that fail with a stale reference first.
    pub stale_failures: u32,
    /// On `select_option`, replace whatever sits at the locator with this markup.
    pub on_select: Option<(Locator, String)>,
}

impl FakeElement {
    pub fn html(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            ..Default::default()
        }
    }

    pub fn link(href: &str, text: &str) -> Self {
        Self {
            markup: format!("<a href=\"{href}\">{text}</a>"),
            text: text.to_string(),
            ..Default::default()
        }
        .attr("href", href)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn appearing_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn stale_times(mut self, n: u32) -> Self {
        self.stale_failures = n;
        self
    }

    pub fn selecting_replaces(mut self, locator: Locator, markup: impl Into<String>) -> Self {
        self.on_select = Some((locator, markup.into()));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    elements: Vec<(Locator, Vec<FakeElement>)>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, locator: Locator, element: FakeElement) -> Self {
        self.with_all(locator, vec![element])
    }

    pub fn with_all(mut self, locator: Locator, elements: Vec<FakeElement>) -> Self {
        match self.elements.iter_mut().find(|(l, _)| *l == locator) {
            Some((_, existing)) => existing.extend(elements),
            None => self.elements.push((locator, elements)),
        }
        self
    }

    fn replace(&mut self, locator: Locator, markup: String) {
        self.elements.retain(|(l, _)| *l != locator);
        self.elements.push((locator, vec![FakeElement::html(markup)]));
    }
}

pub struct FakeDriver {
    pages: HashMap<String, FakePage>,
    location: String,
    loaded_at: Instant,
    broken_urls: HashSet<String>,
    handles: Vec<(String, Locator, usize)>,
    pub visited: Vec<String>,
    pub clicked: Vec<String>,
    pub selected: Vec<String>,
}

impl FakeDriver {
    /// A driver already sitting on `start`.
    pub fn new(start: &str) -> Self {
        Self {
            pages: HashMap::new(),
            location: start.to_string(),
            loaded_at: Instant::now(),
            broken_urls: HashSet::new(),
            handles: Vec::new(),
            visited: Vec::new(),
            clicked: Vec::new(),
            selected: Vec::new(),
        }
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn broken(mut self, url: &str) -> Self {
        self.broken_urls.insert(url.to_string());
        self
    }

    fn visible(&self, element: &FakeElement) -> bool {
        self.loaded_at.elapsed() >= element.appears_after
    }

    fn candidates(&self, locator: &Locator) -> Vec<usize> {
        let Some(page) = self.pages.get(&self.location) else {
            return vec![];
        };
        page.elements
            .iter()
            .find(|(l, _)| l == locator)
            .map(|(_, els)| {
                els.iter()
                    .enumerate()
                    .filter(|(_, el)| self.visible(el))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn register(&mut self, locator: &Locator, idx: usize) -> ElementHandle {
        self.handles.push((self.location.clone(), locator.clone(), idx));
        ElementHandle((self.handles.len() - 1).to_string())
    }

    fn resolve(&mut self, handle: &ElementHandle) -> Result<&mut FakeElement, DriverError> {
        let missing = || DriverError::NoSuchElement(handle.0.clone());
        let idx: usize = handle.0.parse().map_err(|_| missing())?;
        let (url, locator, pos) = self.handles.get(idx).cloned().ok_or_else(missing)?;
        if url != self.location {
            return Err(DriverError::StaleElement(handle.0.clone()));
        }
        self.pages
            .get_mut(&url)
            .and_then(|p| p.elements.iter_mut().find(|(l, _)| *l == locator))
            .and_then(|(_, els)| els.get_mut(pos))
            .ok_or_else(missing)
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.visited.push(url.to_string());
        if self.broken_urls.contains(url) || !self.pages.contains_key(url) {
            return Err(DriverError::Protocol {
                code: "unknown error".into(),
                message: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        self.location = url.to_string();
        self.loaded_at = Instant::now();
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String, DriverError> {
        Ok(self.location.clone())
    }

    async fn find(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self
            .candidates(locator)
            .first()
            .copied()
            .map(|idx| self.register(locator, idx)))
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let found = self.candidates(locator);
        Ok(found.into_iter().map(|idx| self.register(locator, idx)).collect())
    }

    async fn read_markup(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        Ok(self.resolve(element)?.markup.clone())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.resolve(element)?.attributes.get(name).cloned())
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        Ok(self.resolve(element)?.text.clone())
    }

    async fn is_interactable(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(!self.resolve(element)?.hidden)
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        let el = self.resolve(element)?;
        if el.stale_failures > 0 {
            el.stale_failures -= 1;
            return Err(DriverError::StaleElement(element.0.clone()));
        }
        let markup = el.markup.clone();
        self.clicked.push(markup);
        Ok(())
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), DriverError> {
        let el = self.resolve(element)?;
        if el.stale_failures > 0 {
            el.stale_failures -= 1;
            return Err(DriverError::StaleElement(element.0.clone()));
        }
        let effect = el.on_select.clone();
        self.selected.push(value.to_string());
        if let Some((locator, markup)) = effect {
            if let Some(page) = self.pages.get_mut(&self.location) {
                page.replace(locator, markup);
            }
        }
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        let Some(page) = self.pages.get(&self.location) else {
            return Ok(String::new());
        };
        let body: String = page
            .elements
            .iter()
            .flat_map(|(_, els)| els.iter())
            .filter(|el| self.visible(el))
            .map(|el| el.markup.as_str())
            .collect();
        Ok(format!("<html><body>{body}</body></html>"))
    }

    async fn run_script(&mut self, _script: &str, _args: Vec<Value>) -> Result<Value, DriverError> {
        Ok(Value::Null)
    }
}
