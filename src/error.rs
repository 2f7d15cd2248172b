use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("open failed: {0}")]
    OpenFailed(String),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("usage error: {0}")]
    Usage(String),
}
