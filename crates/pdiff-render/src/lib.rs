//! pdiff-render
//!
//! Page renderer boundary.
//!
//! The reconciliation driver needs exactly four things from a browser:
//! load a URL, wait until the page says it is ready, pull structured values
//! out of the loaded document, and shut down. [`PageRenderer`] is that
//! contract; [`WebDriverRenderer`] implements it over the W3C WebDriver HTTP
//! protocol (chromedriver / geckodriver).
//!
//! This crate does not parse values; it hands back a
//! [`pdiff_reconcile::RawPage`] and the reconcile crate does the rest.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

pub use pdiff_reconcile::RawPage;

pub mod script;
#[cfg(feature = "testkit")]
pub mod testkit;
mod webdriver;

pub use webdriver::{Browser, WebDriverConfig, WebDriverRenderer};

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Condition a loaded page must satisfy before values are extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyCondition {
    /// JavaScript expression evaluated in the page; ready when truthy.
    /// Exceptions while evaluating count as "not ready yet".
    Script(String),
    /// CSS selector; ready when at least one element matches.
    Selector(String),
}

impl fmt::Display for ReadyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadyCondition::Script(expr) => write!(f, "script `{expr}`"),
            ReadyCondition::Selector(sel) => write!(f, "selector `{sel}`"),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction spec
// ---------------------------------------------------------------------------

/// Where one flat field lives in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSelector {
    pub key: String,
    pub selector: String,
}

/// Where the valuation table lives.
///
/// Each child of `container` is a row, each child of a row is a column. The
/// value text is read from the `value_child`-th child of a column, or from
/// the column itself when `value_child` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSelector {
    pub container: String,
    pub value_child: Option<usize>,
}

/// Everything the extraction script needs to know about a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSpec {
    pub fields: Vec<FieldSelector>,
    pub table: TableSelector,
}

impl ExtractionSpec {
    /// Build field selectors by substituting each key into `template`
    /// (`[data-hook="{key}"]` -> `[data-hook="owner-name"]`).
    pub fn from_template(keys: &[String], template: &str, table: TableSelector) -> Self {
        let fields = keys
            .iter()
            .map(|k| FieldSelector {
                key: k.clone(),
                selector: template.replace("{key}", k),
            })
            .collect();
        Self { fields, table }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`PageRenderer`] may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Network or transport failure talking to the renderer.
    Transport(String),
    /// The renderer answered with a protocol-level error.
    WebDriver { error: String, message: String },
    /// A readiness condition did not hold within its timeout.
    Timeout { condition: String, waited_ms: u64 },
    /// A response payload could not be decoded.
    Decode(String),
    /// The renderer session is already closed.
    Closed,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Transport(msg) => write!(f, "transport error: {msg}"),
            RenderError::WebDriver { error, message } => {
                write!(f, "webdriver error '{error}': {message}")
            }
            RenderError::Timeout {
                condition,
                waited_ms,
            } => write!(f, "timed out after {waited_ms}ms waiting for {condition}"),
            RenderError::Decode(msg) => write!(f, "decode error: {msg}"),
            RenderError::Closed => write!(f, "renderer session is closed"),
        }
    }
}

impl std::error::Error for RenderError {}

// ---------------------------------------------------------------------------
// Renderer trait
// ---------------------------------------------------------------------------

/// A browser-like page renderer, reused sequentially across many pages.
///
/// One logical owner drives it at a time (`&mut self` everywhere), so no
/// locking is needed. Implementations must be `Send` so the owner can live on
/// a multi-threaded runtime.
#[async_trait::async_trait]
pub trait PageRenderer: Send {
    /// Human-readable name (e.g. `"webdriver"`).
    fn name(&self) -> &'static str;

    /// Load `url` into the session, replacing the current document.
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Block until `condition` holds on the current document or `timeout`
    /// elapses.
    async fn wait_until(
        &mut self,
        condition: &ReadyCondition,
        timeout: Duration,
    ) -> Result<(), RenderError>;

    /// Evaluate `spec` against the current document.
    async fn extract_structured(&mut self, spec: &ExtractionSpec) -> Result<RawPage, RenderError>;

    /// Release the underlying session. Later calls are no-ops.
    async fn close(&mut self) -> Result<(), RenderError>;
}
