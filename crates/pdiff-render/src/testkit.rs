//! Scripted in-process renderer for tests.
//!
//! Serves canned [`RawPage`]s keyed by URL and records every call so tests
//! can assert on fetch order, skipped accounts, and close-exactly-once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{ExtractionSpec, PageRenderer, RawPage, ReadyCondition, RenderError};

/// Behaviour of one scripted URL.
#[derive(Debug, Clone)]
pub enum ScriptedPage {
    /// Loads, becomes ready, and extracts to this page.
    Ready(RawPage),
    /// Navigation fails with a transport error.
    NavigateFails(String),
    /// Loads but no readiness condition ever holds.
    NeverReady,
}

/// One recorded renderer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Navigate(String),
    WaitUntil(String),
    Extract,
    Close,
}

/// Shared call log; clone it before handing the renderer away.
#[derive(Debug, Clone, Default)]
pub struct RenderLog(Arc<Mutex<Vec<RenderCall>>>);

impl RenderLog {
    fn push(&self, call: RenderCall) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RenderCall::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == RenderCall::Close)
            .count()
    }
}

#[derive(Debug, Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, ScriptedPage>,
    current: Option<String>,
    log: RenderLog,
    closed: bool,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    pub fn log(&self) -> RenderLog {
        self.log.clone()
    }

    fn current_page(&self) -> Result<&ScriptedPage, RenderError> {
        self.current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .ok_or_else(|| RenderError::Transport("no page loaded".to_string()))
    }
}

#[async_trait::async_trait]
impl PageRenderer for ScriptedRenderer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        if self.closed {
            return Err(RenderError::Closed);
        }
        self.log.push(RenderCall::Navigate(url.to_string()));
        self.current = None;
        match self.pages.get(url) {
            None => Err(RenderError::Transport(format!("no scripted page for {url}"))),
            Some(ScriptedPage::NavigateFails(msg)) => Err(RenderError::Transport(msg.clone())),
            Some(_) => {
                self.current = Some(url.to_string());
                Ok(())
            }
        }
    }

    async fn wait_until(
        &mut self,
        condition: &ReadyCondition,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        self.log.push(RenderCall::WaitUntil(condition.to_string()));
        match self.current_page()? {
            ScriptedPage::NeverReady => Err(RenderError::Timeout {
                condition: condition.to_string(),
                waited_ms: timeout.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }

    async fn extract_structured(&mut self, _spec: &ExtractionSpec) -> Result<RawPage, RenderError> {
        self.log.push(RenderCall::Extract);
        match self.current_page()? {
            ScriptedPage::Ready(page) => Ok(page.clone()),
            other => Err(RenderError::Decode(format!(
                "scripted page cannot be extracted: {other:?}"
            ))),
        }
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.log.push(RenderCall::Close);
        self.closed = true;
        Ok(())
    }
}
