//! Server supervision and tool dispatch.
//!
//! # Structure
//! - `process` - [`McpServerProcess`], the start / call / stop lifecycle
//! - `readiness` - when a freshly started server is usable
//! - `connection` - handshake, paginated discovery and `tools/call`
//! - `schema` - argument validation against `inputSchema`
//! - `group` - several servers started and stopped as one scope
//! - `cli` - a command line program exposed as a tool

#[cfg(feature = "native-transport")]
mod cli;
mod connection;
mod error;
mod group;
mod interface;
mod process;
mod readiness;
mod schema;

#[cfg(feature = "native-transport")]
pub use cli::CliToolServer;
pub use error::{ServerStartError, ToolCallError};
pub use group::ServerGroup;
pub use interface::ToolServerInterface;
pub use process::McpServerProcess;
