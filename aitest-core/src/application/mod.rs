//! Application layer
//!
//! - `tooling` - server supervision and tool dispatch
//! - `agent` - the turn loop
//! - `governor` - deadline and retries around a run

pub mod agent;
pub mod governor;
pub mod tooling;
