use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error category for decision-making (retry, abort, reconnect, etc.)
/// Crosses the boundary as a small integer in the error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - retry may resolve
    Transient,
    /// Fatal error - should abort operation
    Fatal,
    /// Validation error - invalid user input
    Validation,
    /// Connection lost - should reconnect
    ConnectionLost,
}

impl ErrorCategory {
    /// Maps the engine's category code. Unknown codes are treated as fatal.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ErrorCategory::Transient,
            1 => ErrorCategory::Fatal,
            2 => ErrorCategory::Validation,
            3 => ErrorCategory::ConnectionLost,
            _ => ErrorCategory::Fatal,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// The native engine reported a non-zero status through the error record.
    #[error("Native error {code} [{sql_state}]: {message}")]
    Native {
        code: i32,
        category: ErrorCategory,
        sql_state: String,
        message: String,
    },

    /// Operation attempted on a released or never-opened handle.
    #[error("Handle is not live: {0}")]
    HandleState(&'static str),

    /// A native record's shape or encoding could not be decoded.
    #[error("Marshal error: {0}")]
    Marshal(String),

    /// Read attempted on a closed binary stream.
    #[error("Stream is closed")]
    StreamClosed,

    /// The native connectivity library or one of its symbols failed to load.
    #[error("Library load error: {0}")]
    LibraryLoad(String),

    #[error("Connection string is empty")]
    EmptyConnectionString,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl BridgeError {
    pub fn native_code(&self) -> i32 {
        match self {
            BridgeError::Native { code, .. } => *code,
            _ => 0,
        }
    }

    pub fn sql_state(&self) -> &str {
        match self {
            BridgeError::Native { sql_state, .. } => sql_state,
            _ => "",
        }
    }

    pub fn message(&self) -> String {
        match self {
            BridgeError::Native { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    /// Returns true if the error is transient and may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Native {
                category: ErrorCategory::Transient,
                ..
            }
        )
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        match self {
            BridgeError::EmptyConnectionString => true,
            BridgeError::Native { category, .. } => *category == ErrorCategory::ConnectionLost,
            _ => false,
        }
    }

    /// Returns the error category for decision-making
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            BridgeError::Native { category, .. } => *category,
            BridgeError::EmptyConnectionString => ErrorCategory::ConnectionLost,
            BridgeError::HandleState(_)
            | BridgeError::Marshal(_)
            | BridgeError::StreamClosed
            | BridgeError::LibraryLoad(_)
            | BridgeError::InternalError(_) => ErrorCategory::Fatal,
        }
    }

    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            code: self.native_code(),
            sql_state: self.sql_state().to_string(),
            message: self.message(),
        }
    }
}

/// Flat error view for logging and serialization to client layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: i32,
    pub sql_state: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
