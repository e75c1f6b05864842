use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session identifier must not be empty")]
    EmptyId,
}
