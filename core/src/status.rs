//! Client status model and its lifecycle cell.
//!
//! # Design
//! The status is a session snapshot owned by the client. It is absent until
//! first needed, created by a `StatusInitOperation`, shared with callers as
//! an `Arc<S>`, and replaced wholesale (never mutated behind a reader's
//! back). Authentication works on a clone and swaps the result in.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::client::ServiceClient;
use crate::error::Result;

/// Session state tracked by a client across calls.
pub trait ClientStatus: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> ClientStatus for T {}

/// A status that can carry authentication material.
pub trait AuthenticableStatus: ClientStatus {
    /// True iff valid, non-expired authentication material is held.
    fn is_authenticated(&self) -> bool;

    /// Drop any authentication material.
    fn reset_authentication(&mut self);
}

/// Creates a fresh status for a client.
///
/// May only execute `Requirement::Independent` operations on `client`.
/// Anything that needs the status fails with
/// `ClientError::ReentrantInitialization`.
#[async_trait]
pub trait StatusInitOperation<S: ClientStatus>: Send + Sync {
    async fn initialize(&self, client: &ServiceClient<S>) -> Result<S>;
}

/// Status init operation for clients whose status needs no remote call.
pub struct DefaultStatus;

#[async_trait]
impl<S: ClientStatus + Default> StatusInitOperation<S> for DefaultStatus {
    async fn initialize(&self, _client: &ServiceClient<S>) -> Result<S> {
        Ok(S::default())
    }
}

/// Cached status plus the gate that makes `ensure_initialized` single-flight.
pub(crate) struct StatusCell<S> {
    current: RwLock<Option<Arc<S>>>,
    init_gate: Mutex<()>,
}

impl<S> StatusCell<S> {
    pub(crate) fn new() -> Self {
        Self {
            current: RwLock::new(None),
            init_gate: Mutex::new(()),
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<S>> {
        self.current.read().clone()
    }

    pub(crate) fn set(&self, status: S) -> Arc<S> {
        let status = Arc::new(status);
        *self.current.write() = Some(status.clone());
        status
    }

    pub(crate) fn clear(&self) -> Option<Arc<S>> {
        self.current.write().take()
    }

    pub(crate) fn init_gate(&self) -> &Mutex<()> {
        &self.init_gate
    }
}
