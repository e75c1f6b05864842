//! # aitest-session
//!
//! Named conversation sessions that let independent agent runs continue one
//! logical multi-turn conversation.
//!
//! ```no_run
//! # async fn demo(engine: aitest_core::AgentEngine<aitest_core::model::DynamicModelProvider>, config: aitest_core::AgentConfig) {
//! use aitest_session::{SessionStore, run_in_session};
//!
//! let result = run_in_session(SessionStore::global(), "trip", |prior| async move {
//!     engine.run("I'm planning a trip to Paris", &config, &prior).await
//! })
//! .await
//! .expect("valid session id");
//! assert!(result.success());
//! # }
//! ```

mod error;
mod runner;
mod store;

pub use error::SessionError;
pub use runner::{SessionOutcome, run_in_session};
pub use store::{SessionEntry, SessionStore};
