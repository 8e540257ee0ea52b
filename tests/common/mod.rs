use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::{Request, Respond, ResponseTemplate};

use mcp_relay::mcp::config::ServerConfig;
use mcp_relay::mcp::session::{StdioSession, StdioSessionFactory};
use mcp_relay::mcp::types::Implementation;

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Path to the `mcp_test_server` helper binary.
#[allow(dead_code)]
pub fn test_server_exe() -> String {
    env!("CARGO_BIN_EXE_mcp_test_server").to_string()
}

/// Server declaration running the helper with `args`.
#[allow(dead_code)]
pub fn test_server(name: &str, args: &[&str]) -> ServerConfig {
    ServerConfig::new(name, test_server_exe()).with_args(
        ["--name", name]
            .iter()
            .chain(args.iter())
            .map(|a| a.to_string()),
    )
}

#[allow(dead_code)]
pub fn session_for(config: ServerConfig) -> StdioSession {
    StdioSession::new(config, Implementation::relay(), TIMEOUT, TIMEOUT)
}

#[allow(dead_code)]
pub fn factory() -> StdioSessionFactory {
    StdioSessionFactory::new(TIMEOUT, TIMEOUT)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Anthropic-shaped response body.
#[allow(dead_code)]
pub fn message_body(content: Value) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": content,
        "stop_reason": "end_turn"
    })
}

/// Replies with each body in turn, repeating the last one.
#[allow(dead_code)]
pub struct Sequence {
    bodies: Vec<Value>,
    next: AtomicUsize,
}

#[allow(dead_code)]
impl Sequence {
    pub fn new(bodies: Vec<Value>) -> Self {
        assert!(!bodies.is_empty());
        Self {
            bodies,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self
            .next
            .fetch_add(1, Ordering::SeqCst)
            .min(self.bodies.len() - 1);
        ResponseTemplate::new(200).set_body_json(self.bodies[i].clone())
    }
}
