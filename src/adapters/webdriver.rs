//! Minimal W3C WebDriver client for driving headless Chrome through chromedriver.
//!
//! Only the handful of commands the page reader needs are implemented: session
//! creation, navigation, element lookup, text/attribute reads, diagnostics
//! (URL, source, screenshot) and session deletion.

use crate::domain::ports::{BrowserSession, DriverResult, ElementHandle, SessionLauncher};
use crate::utils::error::{DriverError, MonitorError, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Endpoint of an already running driver. Ignored when `driver_path` is set.
    pub webdriver_url: String,
    /// Spawn this chromedriver binary on `driver_port` instead of connecting to `webdriver_url`.
    pub driver_path: Option<PathBuf>,
    pub driver_port: u16,
    pub request_timeout: Duration,
    pub startup_timeout: Duration,
    pub user_agent: String,
    pub window_size: (u32, u32),
    pub extra_args: Vec<String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            driver_path: None,
            driver_port: 9515,
            request_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_size: (1280, 800),
            extra_args: Vec::new(),
        }
    }
}

impl DriverSettings {
    /// Headless Chrome with images, stylesheets and plugins disabled. Page loads
    /// return immediately; the reader waits for the elements it needs instead.
    pub fn capabilities(&self) -> Value {
        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--window-size={},{}", self.window_size.0, self.window_size.1),
            "--disable-infobars".to_string(),
            "--log-level=3".to_string(),
            format!("--user-agent={}", self.user_agent),
        ];
        args.extend(self.extra_args.iter().cloned());

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "none",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "profile.managed_default_content_settings.images": 2,
                            "profile.managed_default_content_settings.stylesheets": 2,
                            "profile.managed_default_content_settings.plugins": 2,
                            "profile.managed_default_content_settings.javascript": 1
                        }
                    }
                }
            }
        })
    }
}

pub struct WebDriverLauncher {
    settings: DriverSettings,
    client: Client,
}

impl WebDriverLauncher {
    pub fn new(settings: DriverSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self { settings, client })
    }

    fn spawn_driver(&self, path: &PathBuf) -> Result<Child> {
        tracing::info!("Starting {} on port {}", path.display(), self.settings.driver_port);
        Command::new(path)
            .arg(format!("--port={}", self.settings.driver_port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MonitorError::SessionInit {
                message: format!("could not start {}: {}", path.display(), e),
            })
    }

    async fn wait_until_ready(&self, base: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.settings.startup_timeout;
        loop {
            let ready = match execute(self.client.get(format!("{}/status", base))).await {
                Ok(value) => value.get("ready").and_then(Value::as_bool).unwrap_or(false),
                Err(e) => {
                    tracing::debug!("Driver not ready yet: {}", e);
                    false
                }
            };
            if ready {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MonitorError::SessionInit {
                    message: format!(
                        "driver at {} not ready after {:?}",
                        base, self.settings.startup_timeout
                    ),
                });
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

#[async_trait]
impl SessionLauncher for WebDriverLauncher {
    type Session = WebDriverSession;

    async fn launch(&self) -> Result<WebDriverSession> {
        let (base, driver) = match &self.settings.driver_path {
            Some(path) => {
                let child = self.spawn_driver(path)?;
                let base = format!("http://127.0.0.1:{}", self.settings.driver_port);
                self.wait_until_ready(&base).await?;
                (base, Some(child))
            }
            None => (self.settings.webdriver_url.trim_end_matches('/').to_string(), None),
        };

        let created = execute(
            self.client
                .post(format!("{}/session", base))
                .json(&self.settings.capabilities()),
        )
        .await
        .map_err(|e| MonitorError::SessionInit {
            message: format!("new session request failed: {}", e),
        })?;

        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| MonitorError::SessionInit {
                message: format!("no sessionId in response: {}", created),
            })?
            .to_string();

        tracing::info!("WebDriver session {} created", session_id);
        Ok(WebDriverSession {
            client: self.client.clone(),
            base,
            session_id,
            driver: Mutex::new(driver),
        })
    }
}

pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: String,
    driver: Mutex<Option<Child>>,
}

impl WebDriverSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/session/{}{}", self.base, self.session_id, command)
    }

    async fn find_element(&self, command: &str, using: &str, value: &str) -> DriverResult<Option<ElementHandle>> {
        let found = execute(
            self.client
                .post(self.endpoint(command))
                .json(&json!({ "using": using, "value": value })),
        )
        .await;

        match found {
            Ok(element) => element_handle(&element).map(Some),
            Err(DriverError::Protocol { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        execute(self.client.post(self.endpoint("/url")).json(&json!({ "url": url }))).await?;
        Ok(())
    }

    async fn find_visible(&self, selector: &str) -> DriverResult<Option<ElementHandle>> {
        let Some(element) = self.find_element("/element", "css selector", selector).await? else {
            return Ok(None);
        };

        let displayed = execute(
            self.client
                .get(self.endpoint(&format!("/element/{}/displayed", element.0))),
        )
        .await;

        match displayed {
            Ok(value) if value.as_bool() == Some(true) => Ok(Some(element)),
            Ok(_) => Ok(None),
            Err(DriverError::Protocol { error, .. }) if error == "stale element reference" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = execute(self.client.get(self.endpoint(&format!("/element/{}/text", element.0)))).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid_response("element text", &value))
    }

    async fn child_attribute(
        &self,
        element: &ElementHandle,
        tag: &str,
        attribute: &str,
    ) -> DriverResult<Option<String>> {
        let Some(child) = self
            .find_element(&format!("/element/{}/element", element.0), "tag name", tag)
            .await?
        else {
            return Ok(None);
        };

        let value = execute(
            self.client
                .get(self.endpoint(&format!("/element/{}/attribute/{}", child.0, attribute))),
        )
        .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = execute(self.client.get(self.endpoint("/url"))).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid_response("current url", &value))
    }

    async fn page_source(&self) -> DriverResult<String> {
        let value = execute(self.client.get(self.endpoint("/source"))).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid_response("page source", &value))
    }

    async fn screenshot_png(&self) -> DriverResult<Vec<u8>> {
        let value = execute(self.client.get(self.endpoint("/screenshot"))).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| invalid_response("screenshot", &value))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::InvalidResponse {
                message: format!("screenshot is not base64: {}", e),
            })
    }

    async fn quit(&self) -> DriverResult<()> {
        let deleted = execute(
            self.client
                .delete(format!("{}/session/{}", self.base, self.session_id)),
        )
        .await;

        if let Some(mut child) = self.driver.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!("Could not stop driver process: {}", e);
            }
        }

        deleted.map(|_| ())
    }
}

/// Sends a command and unwraps the `value` member of the response.
async fn execute(request: RequestBuilder) -> DriverResult<Value> {
    let response = request.send().await?;
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
        .to_string();
    Err(DriverError::Protocol { error, message })
}

fn element_handle(value: &Value) -> DriverResult<ElementHandle> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(|id| ElementHandle(id.to_string()))
        .ok_or_else(|| invalid_response("element reference", value))
}

fn invalid_response(what: &str, value: &Value) -> DriverError {
    DriverError::InvalidResponse {
        message: format!("expected {}, got {}", what, value),
    }
}
