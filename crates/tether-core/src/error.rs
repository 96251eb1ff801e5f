//! Error types for tether.
//!
//! Dispatch failures are reported to the client inside the result message and
//! never end a session. Encoding failures abort only the synchronization that
//! hit them.

use thiserror::Error;

/// Main error type for the tether library.
#[derive(Debug, Error)]
pub enum TetherError {
    // Dispatch errors
    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("Wrong number of arguments for {name}: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument {index} for {name}: {source}")]
    ArgumentDecode {
        name: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The invoked operation returned an error value. Displays the operation's
    /// own message unchanged since it travels to the client as-is.
    #[error("{0}")]
    Operation(String),

    // Encoding errors
    #[error("Unsupported type: {type_name}")]
    UnsupportedType { type_name: &'static str },

    #[error("Unsupported value: {value}")]
    UnsupportedValue { value: String },

    #[error("Encountered a cycle via {type_name}")]
    Cycle { type_name: &'static str },

    #[error("Node of type {type_name} is reachable from more than one parent")]
    SharedNode { type_name: &'static str },

    // Channel errors
    #[error("Not connected")]
    NotConnected,

    #[error("A client is already connected")]
    AlreadyConnected,

    #[error("Transport error: {message}")]
    Transport { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Malformed diff: {message}")]
    MalformedDiff { message: String },
}

/// Result type alias for tether operations.
pub type Result<T> = std::result::Result<T, TetherError>;

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl TetherError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        TetherError::MalformedDiff {
            message: message.into(),
        }
    }

    /// Check if this error came out of the diff encoder.
    pub fn is_encoding_error(&self) -> bool {
        matches!(
            self,
            TetherError::UnsupportedType { .. }
                | TetherError::UnsupportedValue { .. }
                | TetherError::Cycle { .. }
                | TetherError::SharedNode { .. }
        )
    }

    /// Check if this error belongs in the `e` field of a result message.
    pub fn is_dispatch_error(&self) -> bool {
        matches!(
            self,
            TetherError::UnknownOperation { .. }
                | TetherError::ArityMismatch { .. }
                | TetherError::ArgumentDecode { .. }
                | TetherError::Operation(_)
        )
    }
}
