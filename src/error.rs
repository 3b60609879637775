use std::io;
use std::time::Duration;
use thiserror::Error;

/// An intentional HTTP failure carrying the status and message the client
/// should see.
///
/// Returning one from a handler aborts the rest of its chain and hands it to
/// the application's error handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HttpException {
    pub status: u16,
    pub message: String,
}

impl HttpException {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// An exception with the given status and an empty message.
    pub fn status(status: u16) -> Self {
        Self::new(status, "")
    }
}

impl Default for HttpException {
    fn default() -> Self {
        Self::status(500)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Http(#[from] HttpException),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Timed out parsing body after {0:?}")]
    BodyTimeout(Duration),
    #[error("Invalid route pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Handler panicked: {0}")]
    Panic(String),
    #[error("There was an error attaching listener, {addr} might already be in use")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Shorthand for returning an [`HttpException`] from a handler.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ServerError::Http(HttpException::new(status, message))
    }

    pub fn is_http(&self) -> bool {
        matches!(self, ServerError::Http(_))
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
