use super::http_client;
use crate::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// W3C key under which element references are returned
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const NO_SUCH_ELEMENT: &str = "no such element";
const STALE_ELEMENT: &str = "stale element reference";

/// How to find an element on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    fn selector(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

/// Opaque reference to an element inside a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(String);

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Browser launch options
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub profile_dir: Option<String>,
    pub headless: bool,
}

impl BrowserOptions {
    fn capabilities(&self) -> Value {
        let mut args = vec![
            "--ignore-ssl-errors".to_string(),
            "--ignore-certificate-errors".to_string(),
            "--ignore-certificate-errors-spki-list".to_string(),
        ];
        if let Some(dir) = &self.profile_dir {
            args.push(format!("--user-data-dir={}", dir));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

/// Entry point to a WebDriver server (chromedriver, geckodriver, ...)
#[derive(Clone)]
pub struct WebDriverClient {
    client: Client,
    base_url: String,
}

impl WebDriverClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Start a browser session
    pub async fn new_session(&self, options: &BrowserOptions) -> Result<WebDriverSession> {
        let request = self
            .client
            .post(format!("{}/session", self.base_url))
            .json(&options.capabilities());

        let value = execute(request).await?.map_err(wire_error)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::WebDriver("session response missing sessionId".to_string()))?;

        tracing::info!(session = session_id, "✅ Browser session started");

        Ok(WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
        })
    }
}

/// One live browser session
pub struct WebDriverSession {
    client: Client,
    session_url: String,
}

impl WebDriverSession {
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/url", self.session_url))
            .json(&json!({ "url": url }));
        execute(request).await?.map_err(wire_error)?;
        Ok(())
    }

    /// Find an element, `None` if the page has no match right now
    pub async fn find(&self, locator: &Locator) -> Result<Option<ElementId>> {
        let url = format!("{}/element", self.session_url);
        self.find_at(url, locator).await
    }

    /// Find an element below `parent`
    pub async fn find_child(&self, parent: &ElementId, locator: &Locator) -> Result<Option<ElementId>> {
        let url = format!("{}/element/{}/element", self.session_url, parent.0);
        self.find_at(url, locator).await
    }

    async fn find_at(&self, url: String, locator: &Locator) -> Result<Option<ElementId>> {
        let request = self.client.post(url).json(&json!({
            "using": locator.strategy(),
            "value": locator.selector(),
        }));

        match execute(request).await? {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(ElementId(id.to_string())))
                .ok_or_else(|| Error::WebDriver("element response missing reference".to_string())),
            Err(e) if e.error == NO_SUCH_ELEMENT => Ok(None),
            Err(e) => Err(wire_error(e)),
        }
    }

    pub async fn text(&self, element: &ElementId) -> Result<String> {
        let value = self.get_property(element, "text").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn is_displayed(&self, element: &ElementId) -> Result<bool> {
        Ok(self.get_property(element, "displayed").await?.as_bool().unwrap_or(false))
    }

    pub async fn is_enabled(&self, element: &ElementId) -> Result<bool> {
        Ok(self.get_property(element, "enabled").await?.as_bool().unwrap_or(false))
    }

    async fn get_property(&self, element: &ElementId, property: &str) -> Result<Value> {
        let request = self
            .client
            .get(format!("{}/element/{}/{}", self.session_url, element.0, property));
        execute(request).await?.map_err(wire_error)
    }

    pub async fn click(&self, element: &ElementId) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/element/{}/click", self.session_url, element.0))
            .json(&json!({}));
        execute(request).await?.map_err(wire_error)?;
        Ok(())
    }

    /// Poll until the element is present, `None` once `timeout` has passed
    pub async fn wait_for(
        &self,
        locator: &Locator,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Option<ElementId>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find(locator).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(poll).await;
        }
    }

    /// Poll until the element is present, displayed and enabled
    pub async fn wait_for_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
        poll: Duration,
    ) -> Result<ElementId> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find(locator).await? {
                match self.clickable(&element).await {
                    Ok(true) => return Ok(element),
                    Ok(false) => {}
                    Err(Error::WebDriver(msg)) if msg.starts_with(STALE_ELEMENT) => {}
                    Err(e) => return Err(e),
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::WebDriver(format!(
                    "{} not clickable within {:?}",
                    locator.selector(),
                    timeout
                )));
            }
            sleep(poll).await;
        }
    }

    async fn clickable(&self, element: &ElementId) -> Result<bool> {
        Ok(self.is_displayed(element).await? && self.is_enabled(element).await?)
    }

    /// End the session and close the browser
    pub async fn close(&self) -> Result<()> {
        execute(self.client.delete(&self.session_url))
            .await?
            .map_err(wire_error)?;
        tracing::info!("Browser session closed");
        Ok(())
    }
}

/// Send a command; the outer error is transport, the inner one is a WebDriver error reply
async fn execute(request: RequestBuilder) -> Result<std::result::Result<Value, WireError>> {
    let response = request.send().await?;
    let status = response.status();
    let envelope: WireEnvelope = response.json().await?;

    if status.is_success() {
        return Ok(Ok(envelope.value));
    }

    let error = serde_json::from_value::<WireError>(envelope.value).unwrap_or(WireError {
        error: format!("http {}", status),
        message: String::new(),
    });
    Ok(Err(error))
}

fn wire_error(error: WireError) -> Error {
    Error::WebDriver(format!("{}: {}", error.error, error.message))
}
