use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the authorization broker, the fan-out executor and the
/// workflows built on top of them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error ({server}): {source}")]
    Connection {
        server: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Connection error ({0}): connection is not open")]
    NotOpen(String),

    #[error("Authorization {authorization} denied by {server}")]
    AuthorizationDenied { server: String, authorization: Uuid },

    #[error("Authorization {authorization} on {server} still pending after {elapsed_ms}ms")]
    AuthorizationTimedOut {
        server: String,
        authorization: Uuid,
        elapsed_ms: u128,
    },

    #[error("No valid tokens for '{objperm}' on '{objtype}' ({failures} server(s) failed)")]
    NoValidTokens {
        objtype: String,
        objperm: String,
        failures: usize,
    },

    #[error("Consistency error: {server} returned {actual}, expected {expected}")]
    Consistency {
        server: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(anyhow::Error),

    #[error("Invalid response from {server}: {message}")]
    InvalidResponse { server: String, message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl ClientError {
    pub fn configuration(message: impl fmt::Display) -> Self {
        ClientError::Configuration(anyhow::anyhow!("{}", message))
    }

    pub fn invalid_response(server: &str, message: impl fmt::Display) -> Self {
        ClientError::InvalidResponse {
            server: server.to_string(),
            message: message.to_string(),
        }
    }

    /// True for transport-level failures, including use of a closed connection.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Connection { .. } | ClientError::NotOpen(_)
        )
    }

    /// Name of the server the error originated from, when it is tied to one.
    pub fn server(&self) -> Option<&str> {
        match self {
            ClientError::Connection { server, .. }
            | ClientError::AuthorizationDenied { server, .. }
            | ClientError::AuthorizationTimedOut { server, .. }
            | ClientError::Consistency { server, .. }
            | ClientError::InvalidResponse { server, .. } => Some(server),
            ClientError::NotOpen(server) => Some(server),
            ClientError::NoValidTokens { .. }
            | ClientError::Configuration(_)
            | ClientError::Validation(_) => None,
        }
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Configuration(anyhow::Error::new(err))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
