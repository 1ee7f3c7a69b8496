//! Transport-agnostic client framework for HTTP services.
//!
//! # Overview
//! A service is described as a set of `Operation`s. The client resolves each
//! operation's URI against its base URI, lets the operation write the
//! request, hands it to a `Transport`, and lets the operation interpret the
//! response. Around that pipeline it manages a session status and the
//! authentication lifecycle.
//!
//! # Design
//! - `ServiceClient` owns the status lifecycle: absent, initialized once by a
//!   `StatusInitOperation`, cached, cleared by `reset_status`.
//! - `AuthenticatedClient` adds stored credentials, an
//!   `AuthenticationOperation`, and auto-renewal of expired sessions through
//!   an `AutoRenewalPolicy`.
//! - Each operation declares the context it needs with a `Requirement`
//!   marker; the client ensures status and authentication before running it.
//! - The core performs no I/O of its own. `ReqwestTransport` (feature
//!   `reqwest`) is a ready-made transport.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod operation;
mod pipeline;
pub mod renewal;
pub mod status;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{AuthenticatedClient, AuthenticationOperation, Credentials};
pub use client::ServiceClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result, TransportError};
pub use http::{BodySource, HttpMethod, HttpRequest, HttpResponse, ResponseBody, ResponseMeta};
pub use operation::{Operation, Requirement};
pub use renewal::{AutoRenewalPolicy, ReauthenticateAndRetry, Renewal};
pub use status::{AuthenticableStatus, ClientStatus, DefaultStatus, StatusInitOperation};
pub use transport::Transport;

#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
