use super::{ElementHandle, Locator, PageDriver};
use crate::config::DriverConfig;
use crate::errors::DriverError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

/// W3C key under which element references travel on the wire.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Used when a `<select>` has no `<option>` child with the wanted value
/// (some frameworks render the options lazily).
const SET_SELECT_VALUE: &str = "arguments[0].value = arguments[1];\
     arguments[0].dispatchEvent(new Event('change', { bubbles: true }));";

/// Client for a chromedriver/geckodriver session over the WebDriver
/// JSON protocol. One client = one browser session = one pipeline.
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    max_retries: u32,
    retry_base_ms: u64,
}

impl WebDriverClient {
    /// Open a new browser session.
    pub async fn connect(config: &DriverConfig) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let mut client = Self {
            http,
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            session_id: String::new(),
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
        };

        let created = client
            .send(Method::POST, "session".to_string(), Some(capabilities(config)))
            .await?;
        client.session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Malformed("new session without sessionId".into()))?
            .to_string();

        client
            .session_call(
                Method::POST,
                "timeouts",
                Some(json!({ "pageLoad": config.page_load_timeout_secs * 1000 })),
            )
            .await?;

        info!("WebDriver session {} on {}", client.session_id, client.base_url);
        Ok(client)
    }

    async fn session_call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let path = if path.is_empty() {
            format!("session/{}", self.session_id)
        } else {
            format!("session/{}/{}", self.session_id, path)
        };
        self.send(method, path, body).await
    }

    /// Issue a command, retrying only when the driver could not be reached.
    async fn send(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}/{}", self.base_url, path);
        // 2^n * base: 2x, 4x, 8x ...
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.retry_base_ms)
            .map(jitter)
            .take(self.max_retries as usize);

        RetryIf::spawn(
            strategy,
            || self.send_once(method.clone(), &url, body.as_ref()),
            |err: &DriverError| {
                let retry = matches!(err, DriverError::Http(e) if e.is_connect());
                if retry {
                    warn!("WebDriver unreachable, retrying: {}", err);
                }
                retry
            },
        )
        .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, DriverError> {
        debug!("{} {}", method, url);
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let mut payload: Value = response.json().await?;
        let value = payload
            .get_mut("value")
            .map(Value::take)
            .unwrap_or(Value::Null);

        if status.is_success() {
            Ok(value)
        } else {
            Err(protocol_error(&value))
        }
    }

    fn element_path(element: &ElementHandle, tail: &str) -> String {
        format!("element/{}/{}", element.0, tail)
    }
}

#[async_trait]
impl PageDriver for WebDriverClient {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.session_call(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn current_location(&mut self) -> Result<String, DriverError> {
        let value = self.session_call(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Malformed("url is not a string".into()))
    }

    async fn find(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, DriverError> {
        match self
            .session_call(Method::POST, "element", Some(locator_body(locator)))
            .await
        {
            Ok(value) => element_from(&value).map(Some),
            Err(DriverError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .session_call(Method::POST, "elements", Some(locator_body(locator)))
            .await?;
        value
            .as_array()
            .ok_or_else(|| DriverError::Malformed("elements is not an array".into()))?
            .iter()
            .map(element_from)
            .collect()
    }

    async fn read_markup(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let path = Self::element_path(element, "property/outerHTML");
        let value = self.session_call(Method::GET, &path, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let path = Self::element_path(element, &format!("attribute/{name}"));
        let value = self.session_call(Method::GET, &path, None).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let path = Self::element_path(element, "text");
        let value = self.session_call(Method::GET, &path, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_interactable(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        let displayed = self
            .session_call(Method::GET, &Self::element_path(element, "displayed"), None)
            .await?;
        if !displayed.as_bool().unwrap_or(false) {
            return Ok(false);
        }
        let enabled = self
            .session_call(Method::GET, &Self::element_path(element, "enabled"), None)
            .await?;
        Ok(enabled.as_bool().unwrap_or(false))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.session_call(Method::POST, &Self::element_path(element, "click"), Some(json!({})))
            .await
            .map(drop)
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), DriverError> {
        let option = locator_body(&Locator::css(format!("option[value=\"{value}\"]")));
        match self
            .session_call(Method::POST, &Self::element_path(element, "element"), Some(option))
            .await
        {
            Ok(found) => {
                let option = element_from(&found)?;
                self.click(&option).await
            }
            Err(DriverError::NoSuchElement(_)) => {
                debug!("no <option value={}> rendered, setting value by script", value);
                self.run_script(SET_SELECT_VALUE, vec![element_ref(element), json!(value)])
                    .await
                    .map(drop)
            }
            Err(e) => Err(e),
        }
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        let value = self.session_call(Method::GET, "source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn run_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.session_call(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.session_id.is_empty() {
            return Ok(());
        }
        self.session_call(Method::DELETE, "", None).await?;
        info!("WebDriver session {} closed", self.session_id);
        self.session_id.clear();
        Ok(())
    }
}

// ── Wire helpers ──────────────────────────────────────────────────────────────

fn capabilities(config: &DriverConfig) -> Value {
    let mut args = config.browser_args.clone();
    if config.headless && !args.iter().any(|a| a.starts_with("--headless")) {
        args.push("--headless=new".to_string());
    }

    let options_key = match config.browser.as_str() {
        "firefox" => "moz:firefoxOptions",
        _ => "goog:chromeOptions",
    };

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": config.browser,
                (options_key): { "args": args },
            }
        }
    })
}

fn locator_body(locator: &Locator) -> Value {
    let (using, value) = match locator {
        Locator::Id(id) => ("css selector", format!("[id=\"{id}\"]")),
        Locator::Css(css) => ("css selector", css.clone()),
        Locator::Xpath(xpath) => ("xpath", xpath.clone()),
    };
    json!({ "using": using, "value": value })
}

fn element_from(value: &Value) -> Result<ElementHandle, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
        .ok_or_else(|| DriverError::Malformed(format!("not an element reference: {value}")))
}

fn element_ref(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

fn protocol_error(value: &Value) -> DriverError {
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match code.as_str() {
        "stale element reference" => DriverError::StaleElement(message),
        "no such element" => DriverError::NoSuchElement(message),
        _ => DriverError::Protocol { code, message },
    }
}
