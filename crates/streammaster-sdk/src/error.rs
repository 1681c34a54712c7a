// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use streammaster_protocol::ClientError;
use thiserror::Error;

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// No active hub connection
    #[error("not connected to the StreamMaster hub")]
    NotConnected,

    /// The server reported a failure for the operation
    #[error("remote error: {message}")]
    Remote {
        /// Error message from the server
        message: String,
    },

    /// Transport-level failure (WebSocket, handshake, timeout)
    #[error("connection error: {0}")]
    Connection(String),

    /// REST call returned a non-success status
    #[error("http error: {status} - {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected response from server
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Operation is not in the catalog, so it has no REST route
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The session was closed locally
    #[error("session closed")]
    Closed,
}

impl SdkError {
    /// Whether the caller may reasonably retry the same operation later.
    ///
    /// Connection loss and server-side 5xx are retryable; remote business
    /// errors and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SdkError::NotConnected | SdkError::Connection(_) => true,
            SdkError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

impl From<ClientError> for SdkError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotConnected | ClientError::ConnectionClosed => SdkError::NotConnected,
            ClientError::Remote(message) => SdkError::Remote { message },
            ClientError::InvalidHeader(message) => SdkError::Config(message),
            other => SdkError::Connection(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SdkError::Serialization(err.to_string());
        }
        match err.status() {
            Some(status) => SdkError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SdkError::Connection(err.to_string()),
        }
    }
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_not_connected() {
        assert!(matches!(
            SdkError::from(ClientError::NotConnected),
            SdkError::NotConnected
        ));
        assert!(matches!(
            SdkError::from(ClientError::ConnectionClosed),
            SdkError::NotConnected
        ));
    }

    #[test]
    fn test_remote_error_keeps_message() {
        match SdkError::from(ClientError::Remote("M3U file not found".into())) {
            SdkError::Remote { message } => assert_eq!(message, "M3U file not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SdkError::NotConnected.is_retryable());
        assert!(SdkError::Connection("reset".into()).is_retryable());
        assert!(
            SdkError::Http {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !SdkError::Http {
                status: 404,
                message: "not found".into()
            }
            .is_retryable()
        );
        assert!(
            !SdkError::Remote {
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(!SdkError::Config("missing".into()).is_retryable());
    }
}
