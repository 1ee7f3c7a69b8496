//! Operation descriptors.
//!
//! # Design
//! An `Operation` describes a single remote call: which URI and method it
//! targets, how the request is written, which statuses it accepts, and how
//! the response becomes a result. It holds no mutable state, so one instance
//! can serve any number of concurrent calls.
//!
//! The context an operation needs is declared through the `REQUIREMENT`
//! capability marker rather than through separate traits. The executor reads
//! the marker and ensures the status (and authentication) before the request
//! is built; `status` is always `Some` for `Status` and `Authenticated`
//! operations.

use bytes::Bytes;

use crate::error::{ClientError, Result};
use crate::http::{HttpMethod, HttpRequest, ResponseMeta};

/// Context an operation needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Runs against the base URI alone.
    Independent,
    /// Needs an initialized client status.
    Status,
    /// Needs an initialized status holding a valid authentication.
    Authenticated,
}

/// Descriptor of one remote call against a client with status type `S`.
pub trait Operation<S>: Send + Sync {
    /// Caller-supplied input of one invocation.
    type Params: Send + Sync;
    /// Parsed response body.
    type Entity: Send;
    /// Final result handed back to the caller.
    type Output: Send;

    const REQUIREMENT: Requirement;

    fn method(&self) -> HttpMethod;

    /// Target URI, absolute or relative to the client's base URI.
    fn uri(&self, params: &Self::Params, status: Option<&S>) -> Result<String>;

    /// Write headers and body into the request before it is submitted.
    fn prepare(&self, _request: &mut HttpRequest, _params: &Self::Params, _status: Option<&S>) -> Result<()> {
        Ok(())
    }

    /// Whether `status` counts as a successful response. Defaults to any 2xx.
    fn accepts(&self, status: u16) -> bool {
        (200..300).contains(&status)
    }

    /// Turn a status the operation does not accept into a result or a more
    /// specific failure. The response body has already been discarded.
    fn translate_status(&self, meta: &ResponseMeta, _params: &Self::Params) -> Result<Self::Output> {
        Err(status_error(meta, Self::REQUIREMENT))
    }

    fn parse(&self, body: Bytes) -> Result<Self::Entity>;

    /// Build the result from the parsed entity. `entity` is `None` when the
    /// response had no body.
    fn build_result(
        &self,
        entity: Option<Self::Entity>,
        params: &Self::Params,
        meta: &ResponseMeta,
    ) -> Result<Self::Output>;
}

/// Default mapping of a rejected status to an error.
///
/// A 401 means "authentication required", except for operations that only
/// ever run against an authenticated status: for those the server rejecting
/// the session means it expired.
pub fn status_error(meta: &ResponseMeta, requirement: Requirement) -> ClientError {
    match (meta.status, requirement) {
        (401, Requirement::Authenticated) => ClientError::AuthenticationExpired,
        (401, _) => ClientError::AuthenticationRequired,
        (status, _) => ClientError::UnexpectedStatus {
            status,
            reason: meta.reason.clone(),
        },
    }
}

/// JSON codec helpers for operation parsers and request writers.
pub mod json {
    use bytes::Bytes;
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::error::{ClientError, Result};

    pub fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
        serde_json::from_slice(body).map_err(|e| ClientError::Deserialization(e.to_string()))
    }

    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| ClientError::Serialization(e.to_string()))
    }
}
