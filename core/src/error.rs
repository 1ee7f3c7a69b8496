//! Error types for the service client.
//!
//! # Design
//! Every failure a caller can observe is a `ClientError` variant. The
//! authentication outcomes get dedicated variants because the executor
//! branches on them: only `AuthenticationExpired` starts the auto-renewal
//! flow, and only `CredentialsInvalid` clears stored credentials. Non-2xx
//! responses the operation does not recognize land in `UnexpectedStatus`.

use thiserror::Error;

/// Result type alias using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by the client, its operations and its collaborators.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The base URI handed to the client could not be parsed.
    #[error("invalid base URI {uri:?}: {reason}")]
    InvalidBaseUri { uri: String, reason: String },

    /// An operation URI could not be resolved against the base URI.
    #[error("invalid operation URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// A request header written by the operation is not valid HTTP.
    #[error("invalid request header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The request payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be decoded into the expected entity.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The transport failed to complete the round trip.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server returned a status the operation does not recognize.
    #[error("unexpected HTTP status {status}{}", reason.as_deref().map(|r| format!(" {r}")).unwrap_or_default())]
    UnexpectedStatus { status: u16, reason: Option<String> },

    /// The call needs an authenticated session and none was ever established.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The session was authenticated but the server no longer accepts it.
    #[error("authentication expired")]
    AuthenticationExpired,

    /// `authenticate()` was called without previously stored credentials.
    #[error("credentials not stored")]
    CredentialsNotStored,

    /// The server rejected the supplied credentials.
    #[error("credentials invalid")]
    CredentialsInvalid,

    /// The status init operation needed the status it is creating.
    #[error("status initialization re-entered from its own init operation")]
    ReentrantInitialization,

    /// The renewal policy asked for more retries than the client allows.
    #[error("auto-renewal gave up after {attempts} attempts")]
    RenewalExhausted { attempts: u32 },

    /// The renewal policy finished without producing an outcome.
    #[error("auto-renewal policy finished without resolving the call")]
    RenewalUnresolved,

    /// The renewal policy tried to resolve an already resolved call.
    #[error("renewal outcome already resolved")]
    SinkAlreadyResolved,

    /// Operation-specific failure.
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    pub fn is_authentication_expired(&self) -> bool {
        matches!(self, ClientError::AuthenticationExpired)
    }

    pub fn is_authentication_required(&self) -> bool {
        matches!(self, ClientError::AuthenticationRequired)
    }

    pub fn is_credentials_invalid(&self) -> bool {
        matches!(self, ClientError::CredentialsInvalid)
    }
}

/// Failure reported by a `Transport` implementation.
#[derive(Error, Debug)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
