//! Low-level CDP (Chrome DevTools Protocol) WebSocket client.
//!
//! Connects to a page target's DevTools WebSocket endpoint and provides
//! JSON-RPC command/response correlation. Events are fanned out over a
//! broadcast channel so several consumers (load waits, network-idle waits,
//! the page observer) can each see the full stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>;

/// Default budget for a single command round-trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Events buffered per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A CDP event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// The event method name (e.g. "Page.loadEventFired").
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, serde::Serialize)]
struct CdpCommand<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

/// A CDP response from the browser.
#[derive(Debug, Clone)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<CdpResponseError>,
}

/// Error object in a CDP response.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

// ---------------------------------------------------------------------------
// CdpHandle
// ---------------------------------------------------------------------------

/// Cloneable command sender sharing the connection of a [`CdpClient`].
///
/// Background tasks (dialog handling, for instance) hold a handle so they can
/// issue commands while the owning page keeps the client.
#[derive(Clone)]
pub struct CdpHandle {
    next_id: Arc<AtomicU64>,
    pending: PendingMap,
    writer: Arc<Mutex<WsSink>>,
}

impl CdpHandle {
    /// Send a CDP command and wait for its response.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.send_command_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Send a CDP command with a custom timeout.
    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&CdpCommand { id, method, params }).map_err(|e| {
            BrowserError::Protocol {
                detail: format!("failed to serialize command: {e}"),
            }
        })?;

        tracing::trace!(id, method, "sending CDP command");

        // Register before sending so a fast response cannot be missed.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = self
            .writer
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(BrowserError::Protocol {
                detail: format!("failed to send WebSocket message: {e}"),
            });
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BrowserError::Protocol {
                    detail: "response channel closed unexpectedly".to_string(),
                })
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BrowserError::Timeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(BrowserError::CdpError {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}

// ---------------------------------------------------------------------------
// CdpClient
// ---------------------------------------------------------------------------

/// CDP connection owner: command handle, event fan-out and reader task.
pub struct CdpClient {
    handle: CdpHandle,
    events: broadcast::Sender<CdpEvent>,
    reader: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a Chrome DevTools WebSocket endpoint of the form
    /// `ws://127.0.0.1:{port}/devtools/page/{target_id}`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        tracing::debug!(url = ws_url, "connecting to Chrome DevTools WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = ws_stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let reader = tokio::spawn(read_loop(reader, Arc::clone(&pending), events.clone()));

        Ok(Self {
            handle: CdpHandle {
                next_id: Arc::new(AtomicU64::new(1)),
                pending,
                writer: Arc::new(Mutex::new(writer)),
            },
            events,
            reader,
        })
    }

    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.handle.send_command(method, params).await
    }

    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        self.handle
            .send_command_with_timeout(method, params, timeout)
            .await
    }

    /// A cloneable sender for use from other tasks.
    pub fn handle(&self) -> CdpHandle {
        self.handle.clone()
    }

    /// Subscribe to every event received from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Enable a CDP domain (e.g. "Page", "DOM", "Runtime", "Network").
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        let method = format!("{domain}.enable");
        self.send_command(&method, serde_json::json!({})).await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads WebSocket messages: responses resolve pending commands, everything
/// with a `method` and no `id` is broadcast as an event.
async fn read_loop(
    mut reader: SplitStream<WsStream>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
) {
    while let Some(msg_result) = reader.next().await {
        let text = match msg_result {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Binary(b)) => match String::from_utf8(b.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => {
                tracing::debug!("DevTools WebSocket closed by remote");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "DevTools WebSocket read error, stopping reader");
                break;
            }
        };

        let json: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse CDP message as JSON");
                continue;
            }
        };

        if let Some(response) = parse_cdp_response(&json) {
            match pending.lock().await.remove(&response.id) {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => tracing::debug!(id = response.id, "response for unknown command id"),
            }
        } else if let Some(event) = parse_cdp_event(&json) {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    // Fail every command still waiting on this connection.
    let mut pending_guard = pending.lock().await;
    for (id, tx) in pending_guard.drain() {
        let _ = tx.send(CdpResponse {
            id,
            result: None,
            error: Some(CdpResponseError {
                code: -1,
                message: "WebSocket connection closed".to_string(),
                data: None,
            }),
        });
    }
}

// ---------------------------------------------------------------------------
// CDP protocol helpers
// ---------------------------------------------------------------------------

/// Parse a CDP response JSON into its components.
pub fn parse_cdp_response(json: &Value) -> Option<CdpResponse> {
    let id = json.get("id")?.as_u64()?;
    Some(CdpResponse {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

/// Parse a CDP event JSON into its components.
pub fn parse_cdp_event(json: &Value) -> Option<CdpEvent> {
    if json.get("id").is_some() {
        return None;
    }
    let method = json.get("method")?.as_str()?.to_string();
    let params = json.get("params").cloned().unwrap_or(Value::Null);
    Some(CdpEvent { method, params })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal DevTools endpoint: answers every command with `{"echo": method}`
    /// (or an error for `Fail.me`) and emits one event after the first command.
    async fn fake_devtools() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut sent_event = false;
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let cmd: Value = serde_json::from_str(&text).unwrap();
                let method = cmd["method"].as_str().unwrap_or_default().to_string();
                let reply = if method == "Fail.me" {
                    serde_json::json!({
                        "id": cmd["id"],
                        "error": {"code": -32601, "message": "Method not found"}
                    })
                } else {
                    serde_json::json!({"id": cmd["id"], "result": {"echo": method}})
                };
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                if !sent_event {
                    sent_event = true;
                    let event = serde_json::json!({
                        "method": "Page.loadEventFired",
                        "params": {"timestamp": 1.5}
                    });
                    ws.send(Message::Text(event.to_string().into())).await.unwrap();
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn commands_are_correlated_by_id() {
        let client = CdpClient::connect(&fake_devtools().await).await.unwrap();
        let a = client.send_command("Page.enable", serde_json::json!({})).await.unwrap();
        let b = client.send_command("DOM.enable", serde_json::json!({})).await.unwrap();
        assert_eq!(a["echo"], "Page.enable");
        assert_eq!(b["echo"], "DOM.enable");
    }

    #[tokio::test]
    async fn cdp_errors_are_surfaced() {
        let client = CdpClient::connect(&fake_devtools().await).await.unwrap();
        let err = client
            .send_command("Fail.me", serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            BrowserError::CdpError { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_events() {
        let client = CdpClient::connect(&fake_devtools().await).await.unwrap();
        let mut first = client.subscribe();
        let mut second = client.subscribe();
        client.enable_domain("Page").await.unwrap();

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.method, "Page.loadEventFired");
        assert_eq!(b.method, "Page.loadEventFired");
        assert_eq!(a.params["timestamp"], 1.5);
    }

    #[tokio::test]
    async fn handle_shares_the_connection() {
        let client = CdpClient::connect(&fake_devtools().await).await.unwrap();
        let handle = client.handle();
        let out = tokio::spawn(async move {
            handle
                .send_command("Page.handleJavaScriptDialog", serde_json::json!({"accept": true}))
                .await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out["echo"], "Page.handleJavaScriptDialog");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = CdpClient::connect(&format!("ws://{addr}")).await.err().unwrap();
        assert!(matches!(err, BrowserError::ConnectionFailed { .. }));
    }

    #[test]
    fn parse_response_with_error() {
        let json = serde_json::json!({
            "id": 2,
            "error": {"code": -32602, "message": "Invalid params", "data": "missing 'url'"}
        });
        let resp = parse_cdp_response(&json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.data.as_deref(), Some("missing 'url'"));
    }

    #[test]
    fn events_and_responses_are_distinguished() {
        let event = serde_json::json!({"method": "Network.loadingFinished", "params": {"requestId": "1"}});
        let response = serde_json::json!({"id": 1, "result": {}});
        assert!(parse_cdp_event(&event).is_some());
        assert!(parse_cdp_response(&event).is_none());
        assert!(parse_cdp_event(&response).is_none());
        assert!(parse_cdp_response(&response).is_some());
    }

    #[test]
    fn event_without_params_gets_null() {
        let json = serde_json::json!({"method": "Page.domContentEventFired"});
        let event = parse_cdp_event(&json).unwrap();
        assert_eq!(event.params, Value::Null);
    }
}
