//! Conversation loop and tool dispatch
//!
//! - `driver`: the bounded model/tool loop
//! - `dispatcher`: routes tool-use requests to their owning server

pub mod dispatcher;
pub mod driver;

pub use dispatcher::Dispatcher;
pub use driver::{ConversationDriver, ConversationOutcome, DriverSettings, StopReason};
