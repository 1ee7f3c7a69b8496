//! The transport engine seam.
//!
//! The client never performs I/O itself: it hands a fully built
//! `HttpRequest` to a `Transport` and interprets whatever comes back.
//! Timeouts, connection reuse, TLS and network retries all belong to the
//! implementation behind this trait.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

#[cfg(feature = "reqwest")]
mod reqwest_impl;

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestTransport;

/// Executes one HTTP request against an absolute URI.
///
/// Implementations must return non-2xx responses as `Ok`; status
/// interpretation is the operation's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
