//! Error types for the `domain` layer.
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// `error_kind` says what went wrong and the `source` field holds the
/// original error, if any. `web` turns the `error_kind` into an HTTP status
/// code and never looks past this layer.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// What went wrong, as far as a caller of the domain layer is concerned.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    /// The notification does not exist for this user.
    NotFound,
    /// Input that does not describe a valid event or notification.
    Invalid,
}

impl Error {
    pub fn not_found() -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::NotFound,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error {
            source: Some(reason.into().into()),
            error_kind: DomainErrorKind::Invalid,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// Event data that does not fit the schema of its type.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Invalid,
        }
    }
}

impl From<events::UnknownEventType> for Error {
    fn from(err: events::UnknownEventType) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Invalid,
        }
    }
}
