use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid digest length: {0} (expected an even number between 8 and 64)")]
    InvalidDigestLength(usize),

    #[error("Invalid blob path: {0}")]
    InvalidBlobPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
