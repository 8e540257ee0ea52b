//! MCP server configuration
//!
//! Servers can be declared inline in the YAML config under `mcp.servers` or in
//! a separate JSON file (`mcp.servers_file`) shaped like:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "utils": { "command": "uv", "args": ["run", "server.py"], "env": {} }
//!   }
//! }
//! ```
//!
//! In both places servers are a mapping keyed by name. Declaration order is
//! kept, since bring-up order and tool-name precedence follow it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RelayError, Result};

/// One tool server to launch.
///
/// # Examples
///
/// ```
/// use mcp_relay::mcp::config::ServerConfig;
///
/// let cfg = ServerConfig::new("utils", "uv").with_args(["run", "server.py"]);
/// assert_eq!(cfg.args, vec!["run", "server.py"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Registry key; unique across all configured servers.
    pub name: String,
    /// Executable, resolved through `PATH`.
    pub command: String,
    /// Arguments in order.
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Check the fields a launch depends on.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] for an empty name or command.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RelayError::Config("MCP server name cannot be empty".to_string()).into());
        }
        if self.command.trim().is_empty() {
            return Err(RelayError::Config(format!(
                "MCP server '{}' has an empty command",
                self.name
            ))
            .into());
        }
        Ok(())
    }
}

/// Shape of a single entry in a server mapping; the name is the map key.
#[derive(Debug, Serialize, Deserialize)]
struct ServerEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<PathBuf>,
}

/// `mcp:` section of the application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// JSON file with an `mcpServers` mapping. Its servers come first.
    #[serde(default)]
    pub servers_file: Option<PathBuf>,

    /// Inline servers, in declaration order.
    #[serde(default, with = "ordered_servers")]
    pub servers: Vec<ServerConfig>,

    /// Deadline for each JSON-RPC request after the handshake.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Deadline for the `initialize` handshake.
    #[serde(default = "default_init_timeout_seconds")]
    pub init_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_init_timeout_seconds() -> u64 {
    30
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers_file: None,
            servers: Vec::new(),
            request_timeout_seconds: default_request_timeout_seconds(),
            init_timeout_seconds: default_init_timeout_seconds(),
        }
    }
}

impl McpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_seconds)
    }

    /// Every configured server: those from `servers_file`, then inline ones.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the servers file cannot be read or
    /// parsed, a name appears twice, or an entry fails
    /// [`ServerConfig::validate`].
    pub fn resolve_servers(&self) -> Result<Vec<ServerConfig>> {
        let mut servers = match &self.servers_file {
            Some(path) => load_servers_file(path)?,
            None => Vec::new(),
        };
        servers.extend(self.servers.iter().cloned());

        let mut seen = HashSet::new();
        for server in &servers {
            server.validate()?;
            if !seen.insert(server.name.as_str()) {
                return Err(RelayError::Config(format!(
                    "MCP server '{}' is declared more than once",
                    server.name
                ))
                .into());
            }
        }
        Ok(servers)
    }

    /// Check timeouts. Server entries are checked by [`Self::resolve_servers`].
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(RelayError::Config(
                "mcp.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }
        if self.init_timeout_seconds == 0 {
            return Err(RelayError::Config(
                "mcp.init_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ServersFile {
    #[serde(rename = "mcpServers", with = "ordered_servers")]
    mcp_servers: Vec<ServerConfig>,
}

/// Read a JSON servers file with a top-level `mcpServers` mapping.
///
/// # Errors
///
/// Returns [`RelayError::Config`] if the file cannot be read or parsed.
pub fn load_servers_file(path: &Path) -> Result<Vec<ServerConfig>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RelayError::Config(format!(
            "Failed to read servers file {}: {}",
            path.display(),
            e
        ))
    })?;
    let file: ServersFile = serde_json::from_str(&contents).map_err(|e| {
        RelayError::Config(format!(
            "Failed to parse servers file {}: {}",
            path.display(),
            e
        ))
    })?;
    tracing::debug!(
        path = %path.display(),
        count = file.mcp_servers.len(),
        "Loaded MCP servers file"
    );
    Ok(file.mcp_servers)
}

/// (De)serialize `Vec<ServerConfig>` as a name-keyed mapping, keeping order.
mod ordered_servers {
    use super::*;

    pub fn serialize<S: Serializer>(
        servers: &[ServerConfig],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(servers.len()))?;
        for server in servers {
            map.serialize_entry(
                &server.name,
                &ServerEntry {
                    command: server.command.clone(),
                    args: server.args.clone(),
                    env: server.env.clone(),
                    cwd: server.cwd.clone(),
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<ServerConfig>, D::Error> {
        deserializer.deserialize_map(OrderedServersVisitor)
    }

    struct OrderedServersVisitor;

    impl<'de> Visitor<'de> for OrderedServersVisitor {
        type Value = Vec<ServerConfig>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of server name to {command, args, env, cwd}")
        }

        fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut access: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut servers: Vec<ServerConfig> = Vec::new();
            while let Some((name, entry)) = access.next_entry::<String, ServerEntry>()? {
                if servers.iter().any(|s| s.name == name) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate MCP server name '{}'",
                        name
                    )));
                }
                servers.push(ServerConfig {
                    name,
                    command: entry.command,
                    args: entry.args,
                    env: entry.env,
                    cwd: entry.cwd,
                });
            }
            Ok(servers)
        }
    }
}
