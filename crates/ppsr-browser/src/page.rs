//! The page model consumed by the runner, and its CDP implementation.
//!
//! [`Page`] is the seam between the scripted lookup and the browser: the
//! runner only ever talks to `dyn Page`, so tests drive it with an in-memory
//! double while production uses [`CdpPage`] over a launched Chrome.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::cdp::{CdpEvent, CdpHandle};
use crate::driver::{BrowserDriver, Key, WaitState};
use crate::error::BrowserError;
use crate::launcher::BrowserProcess;
use crate::locator::Locator;

/// How a click reaches the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    /// Real mouse events at the element's center.
    Pointer,
    /// DOM `click()`, bypassing hit-testing.
    Force,
}

/// One browser tab, driven step by step.
#[async_trait]
pub trait Page: Send {
    /// Navigate and wait for DOMContentLoaded.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;
    async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), BrowserError>;
    async fn exists(&mut self, locator: &Locator) -> Result<bool, BrowserError>;
    async fn scroll_into_view(&mut self, locator: &Locator) -> Result<(), BrowserError>;
    async fn click(&mut self, locator: &Locator, mode: ClickMode) -> Result<(), BrowserError>;
    async fn hover(&mut self, locator: &Locator) -> Result<(), BrowserError>;
    /// Empty an input's value.
    async fn clear(&mut self, locator: &Locator) -> Result<(), BrowserError>;
    /// Type one character into the focused element.
    async fn type_char(&mut self, ch: char) -> Result<(), BrowserError>;
    async fn press_key(&mut self, key: Key) -> Result<(), BrowserError>;
    async fn is_checked(&mut self, locator: &Locator) -> Result<bool, BrowserError>;
    /// Check a checkbox. Callers check state first; this always acts.
    async fn check(&mut self, locator: &Locator) -> Result<(), BrowserError>;
    async fn inner_text(&mut self, locator: &Locator) -> Result<String, BrowserError>;
    async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError>;
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError>;
    async fn url(&mut self) -> Result<String, BrowserError>;
    /// PNG bytes of the viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;
    async fn start_tracing(&mut self) -> Result<(), BrowserError>;
    /// Stop tracing and return the collected trace events.
    async fn stop_tracing(&mut self) -> Result<Value, BrowserError>;
    /// Release the browser session. Safe to call once per page.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

// ---------------------------------------------------------------------------
// CdpPage
// ---------------------------------------------------------------------------

/// [`Page`] backed by a Chrome page target.
pub struct CdpPage {
    driver: BrowserDriver,
    slow_mo: Duration,
    observer: tokio::task::JoinHandle<()>,
    process: Option<BrowserProcess>,
}

impl CdpPage {
    /// Wrap a connected driver. `process`, when given, is shut down on close.
    pub fn new(driver: BrowserDriver, slow_mo: Duration, process: Option<BrowserProcess>) -> Self {
        let observer = tokio::spawn(
            observe_page(driver.client().subscribe(), driver.client().handle())
                .instrument(tracing::Span::current()),
        );
        Self {
            driver,
            slow_mo,
            observer,
            process,
        }
    }

    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.pace().await;
        self.driver.goto(url, timeout).await
    }

    async fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.driver.wait_for(locator, state, timeout).await
    }

    async fn exists(&mut self, locator: &Locator) -> Result<bool, BrowserError> {
        self.driver.exists(locator).await
    }

    async fn scroll_into_view(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.driver.scroll_into_view(locator).await
    }

    async fn click(&mut self, locator: &Locator, mode: ClickMode) -> Result<(), BrowserError> {
        self.pace().await;
        match mode {
            ClickMode::Pointer => self.driver.click(locator).await,
            ClickMode::Force => self.driver.force_click(locator).await,
        }
    }

    async fn hover(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.pace().await;
        self.driver.hover(locator).await
    }

    async fn clear(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.pace().await;
        self.driver.clear(locator).await
    }

    async fn type_char(&mut self, ch: char) -> Result<(), BrowserError> {
        self.pace().await;
        self.driver.type_char(ch).await
    }

    async fn press_key(&mut self, key: Key) -> Result<(), BrowserError> {
        self.pace().await;
        self.driver.press_key(key).await
    }

    async fn is_checked(&mut self, locator: &Locator) -> Result<bool, BrowserError> {
        self.driver.is_checked(locator).await
    }

    async fn check(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        self.pace().await;
        self.driver.check(locator).await
    }

    async fn inner_text(&mut self, locator: &Locator) -> Result<String, BrowserError> {
        self.driver.inner_text(locator).await
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        self.driver.evaluate(expression).await
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        self.driver.wait_for_network_idle(timeout).await
    }

    async fn url(&mut self) -> Result<String, BrowserError> {
        self.driver.get_url().await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        self.driver.screenshot().await
    }

    async fn start_tracing(&mut self) -> Result<(), BrowserError> {
        self.driver.start_tracing().await
    }

    async fn stop_tracing(&mut self) -> Result<Value, BrowserError> {
        self.driver.stop_tracing().await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.observer.abort();
        if let Err(e) = self.driver.close_browser().await {
            // The socket usually drops before Chrome answers.
            tracing::debug!(error = %e, "Browser.close did not complete cleanly");
        }
        if let Some(process) = self.process.take() {
            process.shutdown().await;
        }
        Ok(())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

// ---------------------------------------------------------------------------
// Page observer
// ---------------------------------------------------------------------------

/// Logs console output, page errors and failed requests, and accepts any
/// JavaScript dialog so it cannot block the script.
async fn observe_page(mut events: broadcast::Receiver<CdpEvent>, handle: CdpHandle) {
    let mut requests: HashMap<String, (String, String)> = HashMap::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "page observer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event.method.as_str() {
            "Runtime.consoleAPICalled" => {
                let kind = event.params["type"].as_str().unwrap_or("log");
                tracing::info!(kind, text = %console_text(&event.params), "console");
            }
            "Runtime.exceptionThrown" => {
                let details = &event.params["exceptionDetails"];
                let message = details["exception"]["description"]
                    .as_str()
                    .or_else(|| details["text"].as_str())
                    .unwrap_or("unknown exception");
                tracing::error!(message, "page error");
            }
            "Network.requestWillBeSent" => {
                if let Some(id) = event.params["requestId"].as_str() {
                    let method = event.params["request"]["method"].as_str().unwrap_or("GET");
                    let url = event.params["request"]["url"].as_str().unwrap_or_default();
                    requests.insert(id.to_string(), (method.to_string(), url.to_string()));
                }
            }
            "Network.loadingFinished" => {
                if let Some(id) = event.params["requestId"].as_str() {
                    requests.remove(id);
                }
            }
            "Network.loadingFailed" => {
                let id = event.params["requestId"].as_str().unwrap_or_default();
                let failure = event.params["errorText"].as_str().unwrap_or("unknown");
                let (method, url) = requests.remove(id).unwrap_or_default();
                tracing::warn!(%method, %url, failure, "request failed");
            }
            "Page.javascriptDialogOpening" => {
                let kind = event.params["type"].as_str().unwrap_or("alert");
                let message = event.params["message"].as_str().unwrap_or_default();
                tracing::warn!(kind, message, "dialog opened, accepting");
                if let Err(e) = handle
                    .send_command(
                        "Page.handleJavaScriptDialog",
                        serde_json::json!({ "accept": true }),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "failed to accept dialog");
                }
            }
            _ => {}
        }
    }
}

/// Join console call arguments into one line.
fn console_text(params: &Value) -> String {
    params["args"]
        .as_array()
        .map(|args| {
            args.iter()
                .map(|arg| match arg.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(v) => v.to_string(),
                    None => arg["description"].as_str().unwrap_or_default().to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}
