//! BSON codec error type.

use std::io;

use thiserror::Error;

/// Errors raised while reading or writing BSON.
#[derive(Debug, Error)]
pub enum BsonError {
    #[error("malformed BSON: {0}")]
    Format(String),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("type number {0} not recognized")]
    UnrecognizedType(i8),
    #[error("invalid UTF-8")]
    InvalidUtf8,
    #[error("invalid key {0:?}: cstrings must not contain NUL bytes")]
    InvalidKey(String),
    #[error("maximum message length exceeded: {size} bytes > {max} bytes")]
    MessageTooLarge { size: usize, max: usize },
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for BsonError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            BsonError::UnexpectedEof
        } else {
            BsonError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, BsonError>;
