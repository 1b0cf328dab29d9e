//! Error types for Sales Atlas.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for Sales Atlas operations.
#[derive(Error, Debug)]
pub enum AtlasError {
    /// Warehouse connection errors (host unreachable, login rejected, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, timeouts, unexpected result shape, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// A geometry cell that could not be decoded into a point or polygon.
    #[error("Malformed geometry: {0}")]
    MalformedGeometry(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dashboard output errors (unwritable output file, serialization failure).
    #[error("Render error: {0}")]
    Render(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AtlasError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a malformed geometry error with the given message.
    pub fn malformed_geometry(msg: impl Into<String>) -> Self {
        Self::MalformedGeometry(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a render error with the given message.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::MalformedGeometry(_) => "Geometry Error",
            Self::Config(_) => "Configuration Error",
            Self::Render(_) => "Render Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true if the error must abort the whole dashboard pass.
    ///
    /// Only a lost warehouse connection is fatal; every other failure is
    /// confined to the section that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type alias using AtlasError.
pub type Result<T> = std::result::Result<T, AtlasError>;
