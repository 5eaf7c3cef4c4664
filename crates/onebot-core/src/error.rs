//! Unified error types for the OneBot core.
//!
//! Each layer gets its own error enum; transports and the runtime wrap these
//! rather than inventing parallel variants.

use thiserror::Error;

use crate::action::RetCode;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur while starting, running or stopping a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Binding a listener failed.
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// The address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Transport not compiled into this build.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport type that's not available.
        transport: &'static str,
    },

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors produced by the wire codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (text mode) failure.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failure.
    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failure.
    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

// =============================================================================
// Action Errors
// =============================================================================

/// A failed action outcome: a return code plus a human readable message.
///
/// Handlers return this to report business errors; the router copies both
/// fields into the `failed` response untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (retcode {retcode})")]
pub struct ActionError {
    /// Non-zero return code.
    pub retcode: RetCode,
    /// Error description sent to the caller.
    pub message: String,
}

impl ActionError {
    /// Creates an action error.
    ///
    /// A zero return code is replaced by [`RetCode::BAD_HANDLER`], since a
    /// failure must never carry the success code.
    pub fn new(retcode: RetCode, message: impl Into<String>) -> Self {
        let retcode = if retcode.is_ok() {
            RetCode::BAD_HANDLER
        } else {
            retcode
        };
        Self {
            retcode,
            message: message.into(),
        }
    }

    /// Malformed request (11001).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RetCode::BAD_REQUEST, message)
    }

    /// Missing or mistyped parameters (11003).
    pub fn bad_param(message: impl Into<String>) -> Self {
        Self::new(RetCode::BAD_PARAM, message)
    }

    /// Upstream chat platform failure (12300).
    pub fn platform(message: impl Into<String>) -> Self {
        Self::new(RetCode::PLATFORM_ERROR, message)
    }

    /// Action logic failure (12400).
    pub fn logic(message: impl Into<String>) -> Self {
        Self::new(RetCode::LOGIC_ERROR, message)
    }

    /// Faulty handler implementation (13001).
    pub fn bad_handler(message: impl Into<String>) -> Self {
        Self::new(RetCode::BAD_HANDLER, message)
    }
}

// =============================================================================
// Router Errors
// =============================================================================

/// Errors raised when configuring the action router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The action name was empty or whitespace.
    #[error("action name must not be empty")]
    InvalidName,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type returned by action handlers.
pub type ActionResult<T> = Result<T, ActionError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
