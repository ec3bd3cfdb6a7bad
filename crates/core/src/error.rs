//! Error types shared across the system

use thiserror::Error;

/// Base error type for the entire system
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DomainError>;
