//! Error types for the ppsr-browser crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during browser operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to establish a WebSocket connection to Chrome DevTools.
    #[error("failed to connect to Chrome DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The browser process could not be started or never exposed DevTools.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed { reason: String },

    /// A CDP command returned an error response.
    #[error("CDP error {code}: {message}")]
    CdpError {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// A CDP command timed out waiting for a response.
    #[error("CDP command '{method}' timed out after {duration:?}")]
    Timeout { method: String, duration: Duration },

    /// A protocol-level error (serialization, unexpected message format, etc.).
    #[error("CDP protocol error: {detail}")]
    Protocol { detail: String },

    /// The requested DOM element was not found.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// An element did not reach the awaited state in time.
    #[error("timed out after {duration:?} waiting for {selector} to be {state}")]
    WaitTimeout {
        selector: String,
        state: &'static str,
        duration: Duration,
    },

    /// Navigation failed.
    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    /// JavaScript evaluation returned an exception.
    #[error("JavaScript exception: {message}")]
    JsException { message: String },

    /// The page did not load within the expected timeout.
    #[error("page load timed out after {duration:?}")]
    PageLoadTimeout { duration: Duration },

    /// The network never went quiet within the expected timeout.
    #[error("network did not become idle within {duration:?}")]
    NetworkIdleTimeout { duration: Duration },

    /// An element could not be interacted with (e.g., not visible, zero-size).
    #[error("element not interactable: {reason}")]
    ElementNotInteractable { reason: String },
}
