//! Model client implementations

mod base;
mod openai;

pub use base::{AuthScheme, HttpClientBase};
pub use openai::OpenAiCompatibleClient;
