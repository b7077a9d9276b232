//! File readers and writers, and the message sink layer.

pub mod ems;
pub mod messages;
pub mod mps;

use thiserror::Error;

/// File reader failures.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// File writer failures.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("name '{0}' exceeds 8 characters, not representable in fixed MPS")]
    NameTooLong(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
