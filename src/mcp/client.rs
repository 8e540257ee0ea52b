//! Transport-agnostic async JSON-RPC 2.0 client
//!
//! [`JsonRpcClient`] is a channel-backed JSON-RPC 2.0 client that knows
//! nothing about the underlying transport. Callers wire up two
//! [`tokio::sync::mpsc`] channels (outbound and inbound serialized messages)
//! and call [`start_read_loop`] to process responses concurrently.
//!
//! # Design
//!
//! - Outbound messages are written to `outbound_tx` as newline-free JSON
//!   strings. Framing belongs to the transport.
//! - The read loop classifies each inbound message as a response, a
//!   server-initiated request, or a notification.
//! - In-flight requests live in a `pending` map keyed by request ID. Each
//!   entry is a `oneshot::Sender` resolved when the matching response arrives.
//! - A [`CancellationToken`] stops the read loop and drops all pending
//!   senders so awaiting callers get an error instead of hanging.
//! - Once the read loop has exited the client is closed: later requests fail
//!   straight away instead of waiting out their timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, Result};
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, METHOD_PING};

/// Default timeout applied to every request when the caller does not specify one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The pending-response map type: maps request ID to the oneshot sender.
type PendingMap =
    HashMap<u64, oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>>;

/// Transport-agnostic async JSON-RPC 2.0 client.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use mcp_relay::mcp::client::{JsonRpcClient, start_read_loop};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (out_tx, _out_rx) = mpsc::unbounded_channel::<String>();
///     let (_in_tx, in_rx) = mpsc::unbounded_channel::<String>();
///     let token = CancellationToken::new();
///     let client = Arc::new(JsonRpcClient::new("utils", out_tx));
///     let _handle = start_read_loop(in_rx, token, Arc::clone(&client));
///     Ok(())
/// }
/// ```
pub struct JsonRpcClient {
    /// Server name used in timeout errors and log lines.
    server: Arc<str>,
    /// Monotonically increasing request ID counter.
    next_id: Arc<AtomicU64>,
    /// In-flight requests waiting for a response.
    pending: Arc<Mutex<PendingMap>>,
    /// Channel used to send serialized JSON-RPC messages to the transport.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Timeout applied when a request does not specify one.
    default_timeout: Duration,
    /// Cancelled when the read loop exits.
    closed: CancellationToken,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("server", &self.server)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Create a new `JsonRpcClient` for the named server.
    ///
    /// The caller is responsible for wiring the receiving end of
    /// `outbound_tx` to a transport writer and for calling
    /// [`start_read_loop`] with the matching inbound receiver.
    pub fn new(server: impl Into<String>, outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            server: Arc::from(server.into()),
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound_tx,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            closed: CancellationToken::new(),
        }
    }

    /// Replace the timeout used when `request` is called without one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Name of the server this client talks to.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Create a client that shares all internal state with `self`.
    ///
    /// The read loop holds an `Arc<JsonRpcClient>` while the protocol layer
    /// owns its client by value; both must resolve the same `pending` map.
    pub fn clone_shared(&self) -> Self {
        Self {
            server: Arc::clone(&self.server),
            next_id: Arc::clone(&self.next_id),
            pending: Arc::clone(&self.pending),
            outbound_tx: self.outbound_tx.clone(),
            default_timeout: self.default_timeout,
            closed: self.closed.clone(),
        }
    }

    /// Send a JSON-RPC request and await the typed response.
    ///
    /// # Arguments
    ///
    /// * `method` - The JSON-RPC method name.
    /// * `params` - Parameters to serialize into the `params` field.
    /// * `timeout` - Optional timeout; defaults to the client's default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::McpTransport`] if the outbound channel is closed
    /// or the read loop has exited (or exits before a response arrives).
    /// Returns [`RelayError::McpTimeout`] if no response arrives in time.
    /// Returns [`RelayError::Mcp`] if the server returns an error response.
    /// Returns [`RelayError::Serialization`] if (de)serialization fails.
    pub async fn request<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        if self.is_closed() {
            return Err(self.exited_error());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        // Register before sending so the response cannot outrun us.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // The read loop marks the client closed before it clears the map.
            if self.is_closed() {
                return Err(self.exited_error());
            }
            pending.insert(id, tx);
        }

        tracing::debug!(server = %self.server, id, method, "sending MCP request");

        if self.outbound_tx.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RelayError::McpTransport("outbound channel closed".to_string()).into());
        }

        let deadline = timeout.unwrap_or(self.default_timeout);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(RelayError::McpTimeout {
                    server: self.server.to_string(),
                    method: method.to_string(),
                }
                .into());
            }
        };

        let rpc_result = outcome.map_err(|_| self.exited_error())?;

        let value = rpc_result.map_err(|e| RelayError::Mcp(e.to_string()))?;

        serde_json::from_value(value).map_err(|e| RelayError::Serialization(e).into())
    }

    /// Send a JSON-RPC notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::McpTransport`] if the outbound channel is closed.
    pub fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": serde_json::to_value(params)?
        }))?;

        self.outbound_tx
            .send(message)
            .map_err(|_| RelayError::McpTransport("outbound channel closed".to_string()))?;

        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn exited_error(&self) -> anyhow::Error {
        RelayError::McpTransport(format!("server '{}' has exited", self.server)).into()
    }

    /// Number of requests still awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Start the JSON-RPC read loop as a background Tokio task.
///
/// - **Response** (`id` plus `result` or `error`): resolves the matching
///   pending sender.
/// - **Server-initiated request** (`id` plus `method`): `ping` is answered
///   with an empty result; everything else gets `-32601 Method not found`
///   because the relay advertises no client capabilities.
/// - **Notification** (`method`, no `id`): logged at debug level.
///
/// On cancellation or when the inbound channel closes, the client is marked
/// closed and all pending senders are dropped, so in-flight and later
/// `request()` calls fail promptly.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: Arc<JsonRpcClient>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                maybe_msg = inbound_rx.recv() => {
                    let Some(raw) = maybe_msg else {
                        tracing::debug!(server = %client.server, "MCP inbound stream closed");
                        break;
                    };

                    dispatch_message(&raw, &client).await;
                }
            }
        }
        client.closed.cancel();
        client.pending.lock().await.clear();
    })
}

async fn dispatch_message(raw: &str, client: &Arc<JsonRpcClient>) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(server = %client.server, "MCP read loop: failed to parse inbound JSON: {e}");
            return;
        }
    };

    let has_id = value.get("id").is_some_and(|id| !id.is_null());
    let has_method = value.get("method").is_some();
    let has_result = value.get("result").is_some();
    let has_error = value.get("error").is_some();

    if has_id && (has_result || has_error) && !has_method {
        handle_response(value, client).await;
    } else if has_id && has_method {
        handle_server_request(value, client);
    } else if has_method {
        let method = value["method"].as_str().unwrap_or_default();
        tracing::debug!(server = %client.server, method, "MCP notification ignored");
    } else {
        tracing::debug!(
            server = %client.server,
            "MCP read loop: unclassifiable message ignored \
             (has_id={has_id} has_method={has_method} has_result={has_result} has_error={has_error})"
        );
    }
}

async fn handle_response(value: serde_json::Value, client: &Arc<JsonRpcClient>) {
    let id_val = &value["id"];
    let id = match id_val
        .as_u64()
        .or_else(|| id_val.as_str().and_then(|s| s.parse::<u64>().ok()))
    {
        Some(id) => id,
        None => {
            tracing::warn!(server = %client.server, "MCP read loop: response has non-integer id: {id_val}");
            return;
        }
    };

    let Some(tx) = client.pending.lock().await.remove(&id) else {
        tracing::debug!(server = %client.server, "MCP read loop: response for unknown id {id} ignored");
        return;
    };

    let outcome = match value.get("error") {
        Some(error_val) => Err(serde_json::from_value::<JsonRpcError>(error_val.clone())
            .unwrap_or_else(|_| JsonRpcError {
                code: -32603,
                message: format!("malformed error object: {error_val}"),
                data: None,
            })),
        None => Ok(value
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null)),
    };

    // The caller may already have timed out.
    let _ = tx.send(outcome);
}

fn handle_server_request(value: serde_json::Value, client: &Arc<JsonRpcClient>) {
    let method = value
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or_default();
    let id = value.get("id").cloned();

    let response = if method == METHOD_PING {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    } else {
        tracing::debug!(server = %client.server, method, "rejecting server-initiated request");
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {method}"),
                data: None,
            }),
        }
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        let _ = client.outbound_tx.send(serialized);
    }
}
