use std::fmt;

use crate::decode::DecodeError;

/// A result type hardwired to use [`Error`] as its error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type used throughout this library.
#[derive(Debug)]
pub struct Error {
    inner: ErrorKind,
}

impl Error {
    pub(crate) fn from(e: impl Into<ErrorKind>) -> Self {
        Self { inner: e.into() }
    }

    /// Creates an error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            inner: ErrorKind::Other(message.into()),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self {
            inner: ErrorKind::NotFound(what.into()),
        }
    }

    /// Attaches the failed operation and its target (device or adapter) to this error.
    pub fn context(self, operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            inner: ErrorKind::Context {
                operation,
                target: target.into(),
                source: Box::new(self),
            },
        }
    }

    /// Returns whether this error originates from the bus (unreachable bus, failed method call
    /// or an error reply from BlueZ).
    pub fn is_transport(&self) -> bool {
        match &self.inner {
            ErrorKind::Zbus(_) | ErrorKind::Fdo(_) => true,
            ErrorKind::Context { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// Returns whether this error is an entity decoding failure.
    pub fn is_decode(&self) -> bool {
        match &self.inner {
            ErrorKind::Decode(_) => true,
            ErrorKind::Context { source, .. } => source.is_decode(),
            _ => false,
        }
    }

    /// Returns whether this error reports that no device or adapter matched a reference.
    pub fn is_not_found(&self) -> bool {
        match &self.inner {
            ErrorKind::NotFound(_) => true,
            ErrorKind::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorKind::Zbus(e) => e.fmt(f),
            ErrorKind::Fdo(e) => e.fmt(f),
            ErrorKind::Decode(e) => e.fmt(f),
            ErrorKind::NotFound(what) => write!(f, "{} not found", what),
            ErrorKind::Context {
                operation,
                target,
                source,
            } => write!(f, "unable to {} {}: {}", operation, target, source),
            ErrorKind::Io(e) => e.fmt(f),
            ErrorKind::Toml(e) => e.fmt(f),
            ErrorKind::Other(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.inner {
            ErrorKind::Zbus(e) => Some(e),
            ErrorKind::Fdo(e) => Some(e),
            ErrorKind::Decode(e) => Some(e),
            ErrorKind::Context { source, .. } => Some(&**source),
            ErrorKind::Io(e) => Some(e),
            ErrorKind::Toml(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Zbus(zbus::Error),
    Fdo(zbus::fdo::Error),
    Decode(DecodeError),
    NotFound(String),
    Context {
        operation: &'static str,
        target: String,
        source: Box<Error>,
    },
    Io(std::io::Error),
    Toml(toml::de::Error),
    Other(String),
}

impl From<zbus::Error> for ErrorKind {
    fn from(value: zbus::Error) -> Self {
        Self::Zbus(value)
    }
}

impl From<zbus::fdo::Error> for ErrorKind {
    fn from(value: zbus::fdo::Error) -> Self {
        Self::Fdo(value)
    }
}

impl From<DecodeError> for ErrorKind {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ErrorKind {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(value)
    }
}

impl From<String> for ErrorKind {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

impl From<&str> for ErrorKind {
    fn from(value: &str) -> Self {
        Self::Other(value.to_string())
    }
}
