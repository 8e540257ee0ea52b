//! In-process fake transport for session-layer tests
//!
//! [`FakeTransport::new`] returns a `(FakeTransport, FakeTransportHandle)`
//! pair. The transport is handed to the code under test; the handle plays the
//! server:
//!
//! ```text
//! client send() -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx -> inbound_tx  -----> inbound_rx  (client receive())
//! ```
//!
//! Closing the fake drops its outbound sender, so a handle loop over
//! `outbound_rx` ends, and bumps [`FakeTransportHandle::close_calls`].

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{RelayError, Result};
use crate::mcp::transport::Transport;

/// In-memory [`Transport`] used by unit tests.
#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    diagnostics: Vec<String>,
    close_calls: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// Create a connected `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        Self::with_diagnostics(Vec::new())
    }

    /// Like [`FakeTransport::new`], with canned diagnostic lines.
    pub fn with_diagnostics(diagnostics: Vec<String>) -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let close_calls = Arc::new(AtomicUsize::new(0));

        let transport = Self {
            outbound_tx: std::sync::Mutex::new(Some(outbound_tx)),
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            diagnostics,
            close_calls: Arc::clone(&close_calls),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
            close_calls,
        };
        (transport, handle)
    }
}

/// Server side of a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Messages the client sent.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Messages the client will receive.
    pub inbound_tx: mpsc::UnboundedSender<String>,
    /// Number of times [`Transport::close`] was called.
    pub close_calls: Arc<AtomicUsize>,
}

impl FakeTransportHandle {
    /// Answer requests with `respond(method, params)` until the client closes.
    ///
    /// Notifications are recorded but not answered. Returning `Err(value)`
    /// from `respond` sends `value` as the JSON-RPC `error` member. Returns
    /// every method name seen, in order.
    pub fn serve<F>(self, respond: F) -> tokio::task::JoinHandle<Vec<String>>
    where
        F: Fn(&str, &serde_json::Value) -> std::result::Result<serde_json::Value, serde_json::Value>
            + Send
            + 'static,
    {
        let FakeTransportHandle {
            mut outbound_rx,
            inbound_tx,
            ..
        } = self;
        tokio::spawn(async move {
            let mut methods = Vec::new();
            while let Some(raw) = outbound_rx.recv().await {
                let Ok(msg) = serde_json::from_str::<serde_json::Value>(&raw) else {
                    continue;
                };
                let Some(method) = msg.get("method").and_then(|m| m.as_str()) else {
                    continue;
                };
                methods.push(method.to_string());
                if msg.get("id").is_none() {
                    continue;
                }
                let reply = match respond(method, &msg["params"]) {
                    Ok(result) => {
                        serde_json::json!({ "jsonrpc": "2.0", "id": msg["id"], "result": result })
                    }
                    Err(error) => {
                        serde_json::json!({ "jsonrpc": "2.0", "id": msg["id"], "error": error })
                    }
                };
                if inbound_tx.send(reply.to_string()).is_err() {
                    break;
                }
            }
            methods
        })
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        let guard = self
            .outbound_tx
            .lock()
            .map_err(|_| RelayError::McpTransport("fake outbound lock poisoned".into()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| RelayError::McpTransport("fake transport is closed".into()))?;
        tx.send(message).map_err(|e| {
            anyhow::anyhow!(RelayError::McpTransport(format!(
                "fake outbound channel closed: {}",
                e
            )))
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.clone()
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut tx) = self.outbound_tx.lock() {
            tx.take();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;

    #[tokio::test]
    async fn test_send_and_receive_cross_over() {
        let (transport, mut handle) = FakeTransport::new();

        transport.send("ping".to_string()).await.unwrap();
        assert_eq!(handle.outbound_rx.recv().await.unwrap(), "ping");

        handle.inbound_tx.send("pong".to_string()).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), transport.receive().next())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_close_ends_outbound_and_counts_calls() {
        let (transport, mut handle) = FakeTransport::new();

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(handle.outbound_rx.recv().await.is_none());
        assert_eq!(handle.close_calls.load(Ordering::SeqCst), 2);
        assert!(transport.send("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_serve_answers_requests_and_skips_notifications() {
        let (transport, handle) = FakeTransport::new();
        let server = handle.serve(|method, _| match method {
            "ok" => Ok(serde_json::json!({ "fine": true })),
            _ => Err(serde_json::json!({ "code": -32601, "message": "nope" })),
        });

        for msg in [
            r#"{"jsonrpc":"2.0","id":1,"method":"ok","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"note"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"bad","params":{}}"#,
        ] {
            transport.send(msg.to_string()).await.unwrap();
        }

        let mut stream = transport.receive();
        let first: serde_json::Value =
            serde_json::from_str(&stream.next().await.unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&stream.next().await.unwrap()).unwrap();
        assert_eq!(first["result"]["fine"], true);
        assert_eq!(second["error"]["code"], -32601);

        drop(stream);
        transport.close().await.unwrap();
        assert_eq!(server.await.unwrap(), vec!["ok", "note", "bad"]);
    }

    #[test]
    fn test_diagnostics_are_returned_verbatim() {
        let (transport, _handle) = FakeTransport::with_diagnostics(vec!["warming up".into()]);
        assert_eq!(transport.diagnostics(), vec!["warming up"]);
    }
}
