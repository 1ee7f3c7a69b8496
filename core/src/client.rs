//! Service client: status lifecycle and operation execution.
//!
//! # Design
//! `ServiceClient` owns the executor (base URI + transport), the status init
//! operation and the cached status. It is cheap to clone; clones share the
//! same status. Status initialization is single-flight: concurrent callers of
//! `ensure_initialized` wait on one in-flight `initialize_status` instead of
//! each starting their own. An explicit `initialize_status` call always runs
//! the init operation.
//!
//! Authentication lives one layer up, in `AuthenticatedClient`. Executing an
//! `Authenticated` operation directly on a `ServiceClient` fails with
//! `AuthenticationRequired` because there is nothing here that can log in.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::operation::{Operation, Requirement};
use crate::pipeline::Executor;
use crate::status::{ClientStatus, StatusCell, StatusInitOperation};
use crate::transport::Transport;

tokio::task_local! {
    /// Clients whose status init operation is running on the current task.
    static INITIALIZING: Vec<usize>;
}

pub struct ServiceClient<S: ClientStatus> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: ClientStatus> {
    executor: Executor,
    status_init: Box<dyn StatusInitOperation<S>>,
    status: StatusCell<S>,
}

impl<S: ClientStatus> Clone for ServiceClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ClientStatus> ServiceClient<S> {
    /// Create a client. Fails synchronously if `base_uri` is not a valid
    /// absolute URI usable as a base.
    pub fn new(
        base_uri: &str,
        transport: Arc<dyn Transport>,
        status_init: impl StatusInitOperation<S> + 'static,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                executor: Executor::new(base_uri, transport)?,
                status_init: Box::new(status_init),
                status: StatusCell::new(),
            }),
        })
    }

    pub fn from_config(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        status_init: impl StatusInitOperation<S> + 'static,
    ) -> Result<Self> {
        Self::new(&config.base_uri, transport, status_init)
    }

    pub fn base_uri(&self) -> &Url {
        self.inner.executor.base_uri()
    }

    /// Snapshot of the cached status, if any.
    pub fn status(&self) -> Option<Arc<S>> {
        self.inner.status.get()
    }

    /// Return the cached status, initializing it first if absent.
    pub async fn ensure_initialized(&self) -> Result<Arc<S>> {
        if let Some(status) = self.inner.status.get() {
            return Ok(status);
        }
        if self.is_initializing() {
            warn!("status init operation asked for the status it is creating");
            return Err(ClientError::ReentrantInitialization);
        }
        let _gate = self.inner.status.init_gate().lock().await;
        // Another caller may have finished initializing while we waited.
        if let Some(status) = self.inner.status.get() {
            return Ok(status);
        }
        self.initialize_status().await
    }

    /// Run the status init operation and cache its result. On failure the
    /// cached status is left untouched.
    pub async fn initialize_status(&self) -> Result<Arc<S>> {
        debug!("initializing client status");
        let mut running = INITIALIZING.try_with(Clone::clone).unwrap_or_default();
        running.push(self.id());
        let status = INITIALIZING
            .scope(running, self.inner.status_init.initialize(self))
            .await?;
        info!("client status initialized");
        Ok(self.inner.status.set(status))
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn is_initializing(&self) -> bool {
        INITIALIZING
            .try_with(|running| running.contains(&self.id()))
            .unwrap_or(false)
    }

    /// Drop the cached status; the next `ensure_initialized` reinitializes.
    pub fn reset_status(&self) {
        if self.inner.status.clear().is_some() {
            debug!("client status reset");
        }
    }

    /// Install an externally built status, e.g. a restored session.
    pub fn set_status(&self, status: S) -> Arc<S> {
        self.inner.status.set(status)
    }

    /// Execute `op`, ensuring the context its `REQUIREMENT` asks for.
    pub async fn execute<O>(&self, op: &O, params: &O::Params) -> Result<O::Output>
    where
        O: Operation<S>,
    {
        match O::REQUIREMENT {
            Requirement::Independent => self.inner.executor.run(op, params, None).await,
            Requirement::Status => {
                let status = self.ensure_initialized().await?;
                self.inner.executor.run(op, params, Some(status.as_ref())).await
            }
            Requirement::Authenticated => {
                debug!("authenticated operation executed without an authentication manager");
                Err(ClientError::AuthenticationRequired)
            }
        }
    }

    /// Execute `op` against an explicit status instead of the cached one.
    ///
    /// Authentication operations use this to run their login request against
    /// the status they are about to authenticate.
    pub async fn execute_with_status<O>(&self, op: &O, params: &O::Params, status: &S) -> Result<O::Output>
    where
        O: Operation<S>,
    {
        self.inner.executor.run(op, params, Some(status)).await
    }
}
