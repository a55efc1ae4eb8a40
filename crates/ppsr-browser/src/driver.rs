//! High-level browser driver wrapping the CDP client.
//!
//! Provides the primitives the runner script needs: navigation with load
//! state waits, JavaScript evaluation, locator-based element waits and
//! interaction (pointer click, hover, typing, checkbox state), network-idle
//! detection, screenshots and performance tracing.
//!
//! Element operations resolve a [`Locator`] inside the page with
//! `Runtime.evaluate`; pointer and keyboard input is dispatched through the
//! `Input` domain so the page sees real mouse and key events.

use std::collections::HashSet;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cdp::{CdpClient, CdpEvent};
use crate::error::BrowserError;
use crate::locator::Locator;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How long the network must stay quiet to count as idle.
pub const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Interval between element state polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for trace data after `Tracing.end`.
const TRACE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

const TRACE_CATEGORIES: &[&str] = &[
    "devtools.timeline",
    "disabled-by-default-devtools.timeline",
    "disabled-by-default-devtools.screenshot",
    "blink.user_timing",
];

/// Lifecycle event a navigation waits for.
const DOM_CONTENT_LOADED: &str = "Page.domContentEventFired";

/// Element condition awaited by [`BrowserDriver::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Present in the DOM.
    Attached,
    /// Present with a non-empty box and not `visibility: hidden`.
    Visible,
}

impl WaitState {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitState::Attached => "attached",
            WaitState::Visible => "visible",
        }
    }
}

/// Keys the script presses besides plain characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    /// Ctrl+A.
    SelectAll,
}

/// Bounding box of a DOM element in CSS pixels.
#[derive(Debug, Clone)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

// ---------------------------------------------------------------------------
// BrowserDriver
// ---------------------------------------------------------------------------

/// High-level automation driver over one page target.
pub struct BrowserDriver {
    client: CdpClient,
}

impl BrowserDriver {
    /// Connect to a Chrome DevTools page target.
    ///
    /// Enables the Page, DOM, Runtime and Network domains.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let client = CdpClient::connect(ws_url).await?;
        for domain in ["Page", "DOM", "Runtime", "Network"] {
            client.enable_domain(domain).await?;
        }
        Ok(Self { client })
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Navigate and wait for DOMContentLoaded within `timeout`.
    ///
    /// Navigation-level errors (e.g. `net::ERR_NAME_NOT_RESOLVED`) surface as
    /// `NavigationFailed`; a missing lifecycle event as `PageLoadTimeout`.
    pub async fn goto(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        // Subscribe first so a fast load event is not missed.
        let mut events = self.client.subscribe();
        let deadline = Instant::now() + timeout;

        let result = self
            .client
            .send_command_with_timeout("Page.navigate", build_navigate_params(url), timeout)
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(BrowserError::NavigationFailed {
                reason: error_text.to_string(),
            });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        wait_for_event(&mut events, DOM_CONTENT_LOADED, remaining)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                BrowserError::Timeout { .. } => BrowserError::PageLoadTimeout { duration: timeout },
                other => other,
            })
    }

    /// Wait until no request has been in flight for [`NETWORK_QUIET_WINDOW`].
    pub async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), BrowserError> {
        let mut events = self.client.subscribe();
        let deadline = Instant::now() + timeout;
        let mut tracker = NetworkTracker::new(Instant::now());

        loop {
            let now = Instant::now();
            if tracker.is_idle(now) {
                return Ok(());
            }
            if now >= deadline {
                return Err(BrowserError::NetworkIdleTimeout { duration: timeout });
            }
            let wait = tracker.next_check(now).min(deadline - now);
            match tokio::time::timeout(wait, events.recv()).await {
                Err(_) => {}
                Ok(Ok(event)) => tracker.observe(&event, Instant::now()),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "network idle wait lagged behind events");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(BrowserError::Protocol {
                        detail: "WebSocket closed while waiting for network idle".to_string(),
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // JavaScript evaluation
    // -----------------------------------------------------------------------

    /// Evaluate a JavaScript expression in the page context.
    ///
    /// Thrown exceptions are returned as `BrowserError::JsException`.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .client
            .send_command("Runtime.evaluate", build_evaluate_params(expression))
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| exception.get("text").and_then(|t| t.as_str()))
                .unwrap_or("unknown exception")
                .to_string();
            return Err(BrowserError::JsException { message });
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Run `body` with `el` bound to the located element.
    async fn eval_on(&self, locator: &Locator, body: &str) -> Result<Value, BrowserError> {
        let value = self.evaluate(&element_script(locator, body)).await?;
        if value.get("missing").and_then(Value::as_bool).unwrap_or(true) {
            return Err(BrowserError::ElementNotFound {
                selector: locator.to_string(),
            });
        }
        Ok(value.get("value").cloned().unwrap_or(Value::Null))
    }

    // -----------------------------------------------------------------------
    // Element queries
    // -----------------------------------------------------------------------

    pub async fn exists(&self, locator: &Locator) -> Result<bool, BrowserError> {
        let value = self
            .evaluate(&format!("({}) !== null", locator.to_js()))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        let value = self.eval_on(locator, VISIBLE_BODY).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Poll until the element reaches `state` or `timeout` elapses.
    ///
    /// Evaluation errors while polling (for instance a context destroyed by
    /// an in-flight navigation) count as "not yet".
    pub async fn wait_for(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            let reached = match state {
                WaitState::Attached => self.exists(locator).await,
                WaitState::Visible => self.is_visible(locator).await,
            };
            match reached {
                Ok(true) => return Ok(()),
                Ok(false) | Err(BrowserError::ElementNotFound { .. }) => {}
                Err(BrowserError::JsException { message }) => {
                    tracing::debug!(selector = %locator, %message, "element poll raised");
                }
                Err(BrowserError::CdpError { message, .. }) => {
                    tracing::debug!(selector = %locator, %message, "element poll failed");
                }
                Err(e) => return Err(e),
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(BrowserError::WaitTimeout {
                    selector: locator.to_string(),
                    state: state.as_str(),
                    duration: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn is_checked(&self, locator: &Locator) -> Result<bool, BrowserError> {
        let value = self.eval_on(locator, "return el.checked === true;").await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn inner_text(&self, locator: &Locator) -> Result<String, BrowserError> {
        let value = self
            .eval_on(locator, "return el.innerText || el.textContent || '';")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Get the current page URL.
    pub async fn get_url(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "location.href evaluation did not return a string".to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Element interaction
    // -----------------------------------------------------------------------

    pub async fn scroll_into_view(&self, locator: &Locator) -> Result<(), BrowserError> {
        self.eval_on(
            locator,
            "el.scrollIntoView({block: 'center', inline: 'center'}); return true;",
        )
        .await?;
        Ok(())
    }

    /// Viewport box of the element; zero-size elements are not interactable.
    async fn element_box(&self, locator: &Locator) -> Result<ElementBox, BrowserError> {
        let value = self
            .eval_on(
                locator,
                "const r = el.getBoundingClientRect(); return [r.left, r.top, r.width, r.height];",
            )
            .await?;
        let nums: Vec<f64> = value
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        let &[x, y, width, height] = nums.as_slice() else {
            return Err(BrowserError::Protocol {
                detail: format!("unexpected bounding rect for {locator}: {value}"),
            });
        };
        if width <= 0.0 || height <= 0.0 {
            return Err(BrowserError::ElementNotInteractable {
                reason: format!("{locator} has zero or negative size: {width}x{height}"),
            });
        }
        Ok(ElementBox {
            x,
            y,
            width,
            height,
        })
    }

    /// Move the pointer over the element's center.
    pub async fn hover(&self, locator: &Locator) -> Result<(), BrowserError> {
        self.scroll_into_view(locator).await?;
        let (x, y) = self.element_box(locator).await?.center();
        self.client
            .send_command("Input.dispatchMouseEvent", build_mouse_params(x, y, "mouseMoved"))
            .await?;
        Ok(())
    }

    /// Click the element's center with real mouse events.
    pub async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        self.scroll_into_view(locator).await?;
        let (x, y) = self.element_box(locator).await?.center();
        for event_type in ["mouseMoved", "mousePressed", "mouseReleased"] {
            self.client
                .send_command("Input.dispatchMouseEvent", build_mouse_params(x, y, event_type))
                .await?;
        }
        Ok(())
    }

    /// Click through the DOM, skipping hit-testing and visibility checks.
    pub async fn force_click(&self, locator: &Locator) -> Result<(), BrowserError> {
        self.eval_on(locator, "el.click(); return true;").await?;
        Ok(())
    }

    /// Focus the element and empty its value, firing an `input` event.
    pub async fn clear(&self, locator: &Locator) -> Result<(), BrowserError> {
        let editable = self
            .eval_on(
                locator,
                "if (!('value' in el)) return false; el.focus(); el.value = ''; \
                 el.dispatchEvent(new Event('input', {bubbles: true})); return true;",
            )
            .await?;
        if editable.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotInteractable {
                reason: format!("{locator} is not an editable field"),
            })
        }
    }

    /// Type one character into the focused element.
    pub async fn type_char(&self, ch: char) -> Result<(), BrowserError> {
        let text = ch.to_string();
        for event_type in ["keyDown", "keyUp"] {
            self.client
                .send_command("Input.dispatchKeyEvent", build_char_params(event_type, &text))
                .await?;
        }
        Ok(())
    }

    pub async fn press_key(&self, key: Key) -> Result<(), BrowserError> {
        for event_type in ["keyDown", "keyUp"] {
            self.client
                .send_command("Input.dispatchKeyEvent", build_key_params(key, event_type))
                .await?;
        }
        Ok(())
    }

    /// Click a checkbox and confirm it ended up checked.
    pub async fn check(&self, locator: &Locator) -> Result<(), BrowserError> {
        self.click(locator).await?;
        if self.is_checked(locator).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotInteractable {
                reason: format!("clicking {locator} did not check it"),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Screenshots and tracing
    // -----------------------------------------------------------------------

    /// Take a PNG screenshot of the current viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .client
            .send_command("Page.captureScreenshot", serde_json::json!({ "format": "png" }))
            .await?;

        let data_b64 = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Page.captureScreenshot did not return 'data' field".to_string(),
            })?;

        B64.decode(data_b64).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to decode screenshot base64: {e}"),
        })
    }

    /// Start a performance trace; events are delivered on [`Self::stop_tracing`].
    pub async fn start_tracing(&self) -> Result<(), BrowserError> {
        self.client
            .send_command(
                "Tracing.start",
                serde_json::json!({
                    "transferMode": "ReportEvents",
                    "traceConfig": { "includedCategories": TRACE_CATEGORIES },
                }),
            )
            .await?;
        Ok(())
    }

    /// Stop tracing and collect every reported trace event.
    pub async fn stop_tracing(&self) -> Result<Value, BrowserError> {
        let mut events = self.client.subscribe();
        self.client
            .send_command("Tracing.end", serde_json::json!({}))
            .await?;

        let deadline = Instant::now() + TRACE_FLUSH_TIMEOUT;
        let mut collected = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match tokio::time::timeout(remaining, events.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "trace events dropped while collecting");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    return Err(BrowserError::Timeout {
                        method: "Tracing.end".to_string(),
                        duration: TRACE_FLUSH_TIMEOUT,
                    })
                }
            };
            match event.method.as_str() {
                "Tracing.dataCollected" => {
                    if let Some(Value::Array(chunk)) = event.params.get("value") {
                        collected.extend(chunk.iter().cloned());
                    }
                }
                "Tracing.tracingComplete" => return Ok(Value::Array(collected)),
                _ => {}
            }
        }
    }

    /// Ask the browser to shut down. The connection drops right after.
    pub async fn close_browser(&self) -> Result<(), BrowserError> {
        self.client
            .send_command_with_timeout("Browser.close", serde_json::json!({}), Duration::from_secs(5))
            .await?;
        Ok(())
    }
}

/// Wait for the next event named `method`.
async fn wait_for_event(
    events: &mut broadcast::Receiver<CdpEvent>,
    method: &str,
    timeout: Duration,
) -> Result<CdpEvent, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) if event.method == method => return Ok(event),
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                return Err(BrowserError::Protocol {
                    detail: format!("WebSocket closed while waiting for {method}"),
                })
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    method: method.to_string(),
                    duration: timeout,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Network idle tracking
// ---------------------------------------------------------------------------

/// Counts in-flight requests from `Network.*` events.
///
/// Requests already running when tracking starts are invisible to it; their
/// completion events are ignored.
#[derive(Debug)]
pub struct NetworkTracker {
    inflight: HashSet<String>,
    quiet_since: Instant,
}

impl NetworkTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            quiet_since: now,
        }
    }

    pub fn observe(&mut self, event: &CdpEvent, now: Instant) {
        let Some(request_id) = event.params.get("requestId").and_then(Value::as_str) else {
            return;
        };
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                self.inflight.insert(request_id.to_string());
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if self.inflight.remove(request_id) && self.inflight.is_empty() {
                    self.quiet_since = now;
                }
            }
            _ => {}
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.inflight.is_empty() && now.duration_since(self.quiet_since) >= NETWORK_QUIET_WINDOW
    }

    /// How long to sleep before idleness can next change.
    fn next_check(&self, now: Instant) -> Duration {
        if self.inflight.is_empty() {
            (self.quiet_since + NETWORK_QUIET_WINDOW).saturating_duration_since(now)
        } else {
            NETWORK_QUIET_WINDOW
        }
    }
}

// ---------------------------------------------------------------------------
// CDP parameter builders
// ---------------------------------------------------------------------------

const VISIBLE_BODY: &str = "const r = el.getBoundingClientRect(); \
const s = window.getComputedStyle(el); \
return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';";

/// Wrap `body` so it runs with `el` bound, reporting a missing element.
fn element_script(locator: &Locator, body: &str) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return {{ missing: true }}; \
         return {{ missing: false, value: (() => {{ {body} }})() }}; }})()",
        locator.to_js()
    )
}

pub fn build_navigate_params(url: &str) -> Value {
    serde_json::json!({ "url": url })
}

pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

pub fn build_mouse_params(x: f64, y: f64, event_type: &str) -> Value {
    let mut params = serde_json::json!({
        "type": event_type,
        "x": x,
        "y": y,
    });
    if event_type != "mouseMoved" {
        params["button"] = "left".into();
        params["clickCount"] = 1.into();
    }
    params
}

pub fn build_char_params(event_type: &str, text: &str) -> Value {
    serde_json::json!({
        "type": event_type,
        "text": text,
        "unmodifiedText": text,
        "key": text,
    })
}

pub fn build_key_params(key: Key, event_type: &str) -> Value {
    match key {
        Key::Enter => {
            let mut params = serde_json::json!({
                "type": event_type,
                "key": "Enter",
                "code": "Enter",
                "windowsVirtualKeyCode": 13,
            });
            if event_type == "keyDown" {
                params["text"] = "\r".into();
            }
            params
        }
        Key::Backspace => serde_json::json!({
            "type": event_type,
            "key": "Backspace",
            "code": "Backspace",
            "windowsVirtualKeyCode": 8,
        }),
        Key::SelectAll => {
            let mut params = serde_json::json!({
                "type": event_type,
                "key": "a",
                "code": "KeyA",
                "modifiers": 2,
                "windowsVirtualKeyCode": 65,
            });
            if event_type == "keyDown" {
                params["commands"] = serde_json::json!(["selectAll"]);
            }
            params
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn net_event(method: &str, request_id: &str) -> CdpEvent {
        CdpEvent {
            method: method.to_string(),
            params: serde_json::json!({ "requestId": request_id }),
        }
    }

    #[test]
    fn mouse_move_has_no_button() {
        let params = build_mouse_params(10.0, 20.0, "mouseMoved");
        assert_eq!(params["type"], "mouseMoved");
        assert!(params.get("button").is_none());

        let press = build_mouse_params(10.0, 20.0, "mousePressed");
        assert_eq!(press["button"], "left");
        assert_eq!(press["clickCount"], 1);
    }

    #[test]
    fn enter_sends_carriage_return_on_key_down_only() {
        let down = build_key_params(Key::Enter, "keyDown");
        let up = build_key_params(Key::Enter, "keyUp");
        assert_eq!(down["text"], "\r");
        assert_eq!(down["windowsVirtualKeyCode"], 13);
        assert!(up.get("text").is_none());
    }

    #[test]
    fn select_all_uses_ctrl_modifier() {
        let down = build_key_params(Key::SelectAll, "keyDown");
        assert_eq!(down["modifiers"], 2);
        assert_eq!(down["commands"][0], "selectAll");
    }

    #[test]
    fn element_script_reports_missing_elements() {
        let script = element_script(&Locator::css("#vin"), "return el.value;");
        assert!(script.starts_with("(() => { const el = document.querySelector(\"#vin\");"));
        assert!(script.contains("return { missing: true }"));
        assert!(script.contains("return el.value;"));
    }

    #[test]
    fn element_box_center() {
        let b = ElementBox {
            x: 50.0,
            y: 75.0,
            width: 200.0,
            height: 100.0,
        };
        assert_eq!(b.center(), (150.0, 125.0));
    }

    #[test]
    fn tracker_waits_for_quiet_window() {
        let start = Instant::now();
        let tracker = NetworkTracker::new(start);
        assert!(!tracker.is_idle(start));
        assert!(tracker.is_idle(start + NETWORK_QUIET_WINDOW));
    }

    #[test]
    fn tracker_counts_inflight_requests() {
        let start = Instant::now();
        let mut tracker = NetworkTracker::new(start);
        tracker.observe(&net_event("Network.requestWillBeSent", "1"), start);
        tracker.observe(&net_event("Network.requestWillBeSent", "2"), start);
        assert_eq!(tracker.inflight(), 2);

        let later = start + Duration::from_secs(2);
        assert!(!tracker.is_idle(later));

        tracker.observe(&net_event("Network.loadingFinished", "1"), later);
        tracker.observe(&net_event("Network.loadingFailed", "2"), later);
        assert_eq!(tracker.inflight(), 0);
        // The quiet window restarts when the last request completes.
        assert!(!tracker.is_idle(later + Duration::from_millis(100)));
        assert!(tracker.is_idle(later + NETWORK_QUIET_WINDOW));
    }

    #[test]
    fn tracker_ignores_requests_it_never_saw_start() {
        let start = Instant::now();
        let mut tracker = NetworkTracker::new(start);
        let later = start + Duration::from_secs(1);
        tracker.observe(&net_event("Network.loadingFinished", "old"), later);
        // Unknown completions do not reset the quiet window.
        assert!(tracker.is_idle(later));
    }

    /// DevTools endpoint that acks every command. `Page.navigate` to a URL
    /// containing "unreachable" reports an `errorText`; any other navigation
    /// is followed by DOMContentLoaded unless the URL contains "stall".
    async fn fake_page_target() -> String {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let cmd: Value = serde_json::from_str(&text).unwrap();
                let url = cmd["params"]["url"].as_str().unwrap_or_default().to_string();
                let navigating = cmd["method"] == "Page.navigate";
                let result = if navigating && url.contains("unreachable") {
                    serde_json::json!({"frameId": "F1", "errorText": "net::ERR_NAME_NOT_RESOLVED"})
                } else {
                    serde_json::json!({"frameId": "F1"})
                };
                let reply = serde_json::json!({"id": cmd["id"], "result": result});
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                if navigating && !url.contains("unreachable") && !url.contains("stall") {
                    let event = serde_json::json!({
                        "method": DOM_CONTENT_LOADED,
                        "params": {"timestamp": 2.0}
                    });
                    ws.send(Message::Text(event.to_string().into())).await.unwrap();
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn goto_returns_once_dom_content_loaded() {
        let driver = BrowserDriver::connect(&fake_page_target().await).await.unwrap();
        driver
            .goto("http://localhost/ppsr/Login", Duration::from_secs(5))
            .await
            .expect("navigation should complete");
    }

    #[tokio::test]
    async fn goto_surfaces_navigation_errors() {
        let driver = BrowserDriver::connect(&fake_page_target().await).await.unwrap();
        let err = driver
            .goto("http://unreachable.invalid/", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, BrowserError::NavigationFailed { ref reason } if reason.contains("ERR_NAME_NOT_RESOLVED")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn goto_without_load_event_times_out_as_page_load() {
        let driver = BrowserDriver::connect(&fake_page_target().await).await.unwrap();
        let err = driver
            .goto("http://localhost/stall", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::PageLoadTimeout { .. }), "{err}");
    }
}
