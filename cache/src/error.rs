//! Error types for the `cache` crate.
//!
//! Follows the same pattern as `domain::error`: a root `Error` holding an
//! `error_kind` and the optional underlying source. These errors never leave
//! [`crate::CacheLayer`]; they exist so backends can report what went wrong
//! before the layer logs and discards it.
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: CacheErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum CacheErrorKind {
    // No connection could be obtained from the pool
    Unavailable,
    // The backend accepted the connection but the command failed
    Command,
    // The operation did not finish within the configured timeout
    Timeout,
}

impl Error {
    pub fn new(error_kind: CacheErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Cache Error: {:?} ({source})", self.error_kind),
            None => write!(f, "Cache Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        let error_kind = if err.is_connection_dropped() || err.is_io_error() {
            CacheErrorKind::Unavailable
        } else if err.is_timeout() {
            CacheErrorKind::Timeout
        } else {
            CacheErrorKind::Command
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: CacheErrorKind::Unavailable,
        }
    }
}
