//! MCP (Model Context Protocol) client support
//!
//! Speaks MCP over stdio to out-of-process tool servers.
//!
//! # Module Layout
//!
//! - `types`     -- JSON-RPC primitives and the MCP types the relay uses
//! - `client`    -- transport-agnostic async JSON-RPC 2.0 client
//! - `protocol`  -- typed MCP lifecycle over `JsonRpcClient`
//! - `transport` -- `Transport` trait, stdio and fake implementations
//! - `session`   -- one live connection per server (`ToolSession`)
//! - `registry`  -- all sessions, bring-up and teardown
//! - `catalog`   -- merged, deduplicated tool namespace
//! - `config`    -- server declarations

pub mod catalog;
pub mod client;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;
