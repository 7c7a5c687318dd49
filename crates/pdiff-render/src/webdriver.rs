//! W3C WebDriver-backed renderer.
//!
//! Talks to a running driver (chromedriver, geckodriver, selenium) over HTTP.
//! One browser session is opened by [`WebDriverRenderer::connect`] and reused
//! for every page until [`PageRenderer::close`].

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{script, ExtractionSpec, PageRenderer, RawPage, ReadyCondition, RenderError};

/// Browser the driver should launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Some(Browser::Chrome),
            "firefox" => Some(Browser::Firefox),
            _ => None,
        }
    }
}

/// Connection settings for [`WebDriverRenderer`].
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Driver base URL, e.g. `http://localhost:9515`.
    pub endpoint: String,
    pub browser: Browser,
    /// Show the browser window (otherwise headless).
    pub show: bool,
    /// Delay between readiness polls.
    pub poll_interval: Duration,
    /// Browser-side page load timeout.
    pub page_load_timeout: Duration,
}

#[derive(Debug)]
pub struct WebDriverRenderer {
    http: reqwest::Client,
    endpoint: String,
    session_id: Option<String>,
    poll_interval: Duration,
}

impl WebDriverRenderer {
    /// Open a new browser session.
    pub async fn connect(cfg: &WebDriverConfig) -> Result<Self, RenderError> {
        let http = reqwest::Client::new();
        let endpoint = cfg.endpoint.trim_end_matches('/').to_string();

        let body = json!({ "capabilities": { "alwaysMatch": capabilities(cfg) } });
        let value = send(http.post(format!("{endpoint}/session")).json(&body)).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::Decode("new session response has no sessionId".into()))?
            .to_string();

        info!(
            session_id = %session_id,
            browser = cfg.browser.as_str(),
            show = cfg.show,
            "webdriver session opened"
        );

        Ok(Self {
            http,
            endpoint,
            session_id: Some(session_id),
            poll_interval: cfg.poll_interval,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn session_url(&self, suffix: &str) -> Result<String, RenderError> {
        let id = self.session_id.as_deref().ok_or(RenderError::Closed)?;
        Ok(format!("{}/session/{}{}", self.endpoint, id, suffix))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, RenderError> {
        let url = self.session_url("/execute/sync")?;
        send(
            self.http
                .post(url)
                .json(&json!({ "script": script, "args": args })),
        )
        .await
    }
}

#[async_trait::async_trait]
impl PageRenderer for WebDriverRenderer {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        let endpoint = self.session_url("/url")?;
        debug!(url, "navigate");
        send(self.http.post(endpoint).json(&json!({ "url": url }))).await?;
        Ok(())
    }

    async fn wait_until(
        &mut self,
        condition: &ReadyCondition,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let (src, args) = match condition {
            ReadyCondition::Script(expr) => (script::ready_expression(expr), Vec::new()),
            ReadyCondition::Selector(sel) => {
                (script::SELECTOR_PRESENT.to_string(), vec![json!(sel)])
            }
        };

        let started = tokio::time::Instant::now();
        loop {
            match self.execute(&src, args.clone()).await {
                Ok(Value::Bool(true)) => return Ok(()),
                Ok(_) => {}
                // Page mid-navigation; keep polling.
                Err(RenderError::WebDriver { error, .. }) if error == "javascript error" => {}
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(RenderError::Timeout {
                    condition: condition.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - waited)).await;
        }
    }

    async fn extract_structured(&mut self, spec: &ExtractionSpec) -> Result<RawPage, RenderError> {
        let arg = serde_json::to_value(spec)
            .map_err(|e| RenderError::Decode(format!("extraction spec encode failed: {e}")))?;
        let value = self.execute(script::EXTRACT_PAGE, vec![arg]).await?;
        serde_json::from_value(value)
            .map_err(|e| RenderError::Decode(format!("extraction result decode failed: {e}")))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        send(
            self.http
                .delete(format!("{}/session/{}", self.endpoint, id)),
        )
        .await?;
        info!(session_id = %id, "webdriver session closed");
        Ok(())
    }
}

impl Drop for WebDriverRenderer {
    fn drop(&mut self) {
        if let Some(id) = &self.session_id {
            warn!(session_id = %id, "webdriver renderer dropped without close; session leaked");
        }
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

async fn send(req: reqwest::RequestBuilder) -> Result<Value, RenderError> {
    let resp = req
        .send()
        .await
        .map_err(|e| RenderError::Transport(e.to_string()))?;
    let status = resp.status();
    let body: WireResponse = resp
        .json()
        .await
        .map_err(|e| RenderError::Decode(format!("webdriver response json decode failed: {e}")))?;

    if !status.is_success() {
        return Err(match serde_json::from_value::<WireError>(body.value) {
            Ok(err) => RenderError::WebDriver {
                error: err.error,
                message: err.message,
            },
            Err(_) => RenderError::WebDriver {
                error: format!("http {}", status.as_u16()),
                message: "unrecognized error payload".to_string(),
            },
        });
    }

    Ok(body.value)
}

fn capabilities(cfg: &WebDriverConfig) -> Value {
    let timeouts = json!({ "pageLoad": cfg.page_load_timeout.as_millis() as u64 });
    match cfg.browser {
        Browser::Chrome => {
            let args: Vec<&str> = if cfg.show {
                Vec::new()
            } else {
                vec!["--headless=new", "--disable-gpu"]
            };
            json!({
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args },
                "timeouts": timeouts,
            })
        }
        Browser::Firefox => {
            let args: Vec<&str> = if cfg.show { Vec::new() } else { vec!["-headless"] };
            json!({
                "browserName": "firefox",
                "moz:firefoxOptions": { "args": args },
                "timeouts": timeouts,
            })
        }
    }
}
