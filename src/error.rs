use std::path::PathBuf;

use thiserror::Error;

use crate::types::{KeyHandle, KeystoreType};

/// Framework error type
///
/// Backend plugins report their own failures through this type as well; the
/// dispatch layer never reinterprets or rewraps an error a backend returned.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid required input, caught before any backend call
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// A required field of the to-be-signed request has not been set
    #[error("incomplete request: {0}")]
    IncompleteRequest(String),

    /// No backend plugin registered for the keystore type, or the
    /// capability is absent from both dispatch tiers
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Tier-2 lookup reached the backend's symbol provider but the named
    /// extension symbol is absent
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// Key lookup or key material failure inside a backend
    #[error("key error: {0}")]
    Key(String),

    /// DER/PEM encoding or decoding failure
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A CRL is outside its validity window
    #[error("validity error: {0}")]
    Validity(String),

    /// Backend-defined failure, surfaced unmodified
    #[error("backend error: {0}")]
    Backend(String),

    /// Output file could not be opened or created
    #[error("failed to open {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output file could not be completely written
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], recorded in the per-session
/// last-error slot and convenient for tests
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    BadParameter,
    IncompleteRequest,
    PluginNotFound,
    FunctionNotFound,
    Key,
    Encoding,
    Validity,
    Backend,
    OpenFile,
    WriteFile,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadParameter(_) => ErrorKind::BadParameter,
            Error::IncompleteRequest(_) => ErrorKind::IncompleteRequest,
            Error::PluginNotFound(_) => ErrorKind::PluginNotFound,
            Error::FunctionNotFound(_) => ErrorKind::FunctionNotFound,
            Error::Key(_) => ErrorKind::Key,
            Error::Encoding(_) => ErrorKind::Encoding,
            Error::Validity(_) => ErrorKind::Validity,
            Error::Backend(_) => ErrorKind::Backend,
            Error::OpenFile { .. } => ErrorKind::OpenFile,
            Error::WriteFile { .. } => ErrorKind::WriteFile,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn bad_parameter(msg: impl std::fmt::Display) -> Self {
        Error::BadParameter(msg.to_string())
    }

    pub fn incomplete_request(field: &str) -> Self {
        Error::IncompleteRequest(format!("{field} must be set before signing"))
    }

    pub fn no_plugin(kstype: KeystoreType) -> Self {
        Error::PluginNotFound(format!("no backend registered for {kstype:?}"))
    }

    pub fn operation_missing(kstype: KeystoreType, operation: &str) -> Self {
        Error::PluginNotFound(format!(
            "backend for {kstype:?} does not implement {operation}"
        ))
    }

    pub fn symbol_missing(symbol: &str) -> Self {
        Error::FunctionNotFound(format!("extension symbol {symbol:?} not exported"))
    }

    pub fn key_not_found(handle: &KeyHandle) -> Self {
        Error::Key(format!("key not found: {handle:?}"))
    }

    pub fn encoding(err: impl std::fmt::Display) -> Self {
        Error::Encoding(err.to_string())
    }

    pub fn backend(msg: impl std::fmt::Display) -> Self {
        Error::Backend(msg.to_string())
    }
}
