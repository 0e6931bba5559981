//! Error types shared by the stream and control crates.
//!
//! None of these are fatal: a stream error degrades to a `Disconnected`
//! state, an envelope error drops one message, and a control error is
//! returned to whoever issued the command.

use thiserror::Error;

/// A stream payload that could not be classified into an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload is not valid JSON, lacks a known `type`, or is missing a
    /// required field for its variant.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the WebSocket transport.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Opening the transport failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint we tried to reach.
        url: String,
        /// Why it failed.
        reason: String,
    },

    /// The open transport failed while reading or closing.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from control requests against the tracker API.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The request never produced a response (connect, timeout, I/O).
    #[error("{endpoint} request failed: {reason}")]
    Request {
        /// Endpoint path, e.g. `/start`.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The tracker answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("{endpoint} returned an unexpected body: {reason}")]
    Decode {
        /// Endpoint path.
        endpoint: String,
        /// Decoder message.
        reason: String,
    },

    /// The configured base URL cannot be used.
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ControlError {
    /// Endpoint the failing request targeted, when known.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Request { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. } => Some(endpoint),
            Self::InvalidBaseUrl(_) => None,
        }
    }
}

/// A name that does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: '{value}'")]
pub struct UnknownNameError {
    /// What kind of name was expected.
    pub what: &'static str,
    /// The offending input.
    pub value: String,
}

impl UnknownNameError {
    /// Build an error for `value` not being a valid `what`.
    pub fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_owned(),
        }
    }
}
