//! Authentication manager and authenticated execution.
//!
//! # Design
//! `AuthenticatedClient` wraps a `ServiceClient` whose status can carry
//! authentication, and adds stored credentials, the authentication
//! operation, and the auto-renewal switch. Authentication clones the cached
//! status, lets the operation log it in, and swaps the result back into the
//! client. `ensure_authenticated` is single-flight behind its own gate; the
//! explicit `authenticate*` calls take the same gate so two logins on one
//! client never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ServiceClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::operation::{Operation, Requirement};
use crate::renewal::{self, AutoRenewalPolicy};
use crate::status::{AuthenticableStatus, StatusInitOperation};
use crate::transport::Transport;

/// Caller-supplied authentication material.
pub trait Credentials: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Credentials for T {}

/// Logs a status in.
///
/// `authenticate` receives a working copy of the client status and must
/// leave it authenticated on success. Invalid credentials must be reported
/// as `ClientError::CredentialsInvalid` so stored credentials get cleared.
#[async_trait]
pub trait AuthenticationOperation<S: AuthenticableStatus, C: Credentials>: Send + Sync {
    async fn authenticate(&self, client: &ServiceClient<S>, credentials: &C, status: &mut S) -> Result<()>;

    /// Policy applied when an authenticated call reports an expired session.
    fn auto_renewal_policy(&self) -> Option<Arc<dyn AutoRenewalPolicy<S>>> {
        None
    }
}

pub struct AuthenticatedClient<S: AuthenticableStatus, C: Credentials> {
    service: ServiceClient<S>,
    auth: Arc<AuthState<S, C>>,
}

struct AuthState<S: AuthenticableStatus, C: Credentials> {
    operation: Box<dyn AuthenticationOperation<S, C>>,
    stored: parking_lot::Mutex<StoredCredentials<C>>,
    auto_renewal_enabled: AtomicBool,
    max_renewal_attempts: Option<u32>,
    gate: Mutex<()>,
}

/// Stored credentials together with the switch that allows storing them.
/// Both live under one lock so a store never lands after storage was
/// turned off.
struct StoredCredentials<C> {
    enabled: bool,
    credentials: Option<C>,
}

impl<C> StoredCredentials<C> {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            credentials: None,
        }
    }

    fn set_enabled(&mut self, enabled: bool) -> Option<C> {
        self.enabled = enabled;
        if enabled {
            None
        } else {
            self.credentials.take()
        }
    }

    /// Keep `credentials` if storing is enabled. Returns whether they were kept.
    fn store(&mut self, credentials: C) -> bool {
        if self.enabled {
            self.credentials = Some(credentials);
        }
        self.enabled
    }
}

impl<S: AuthenticableStatus, C: Credentials> Clone for AuthenticatedClient<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<S: AuthenticableStatus, C: Credentials> AuthenticatedClient<S, C> {
    /// Wrap `service` with default settings: credentials are stored and
    /// auto-renewal is enabled.
    pub fn new(service: ServiceClient<S>, operation: impl AuthenticationOperation<S, C> + 'static) -> Self {
        Self::with_config(service, operation, &ClientConfig::default())
    }

    /// Wrap `service` using the flags of `config`. `config.base_uri` is not
    /// consulted.
    pub fn with_config(
        service: ServiceClient<S>,
        operation: impl AuthenticationOperation<S, C> + 'static,
        config: &ClientConfig,
    ) -> Self {
        Self {
            service,
            auth: Arc::new(AuthState {
                operation: Box::new(operation),
                stored: parking_lot::Mutex::new(StoredCredentials::new(config.store_credentials)),
                auto_renewal_enabled: AtomicBool::new(config.auto_renewal),
                max_renewal_attempts: config.max_renewal_attempts,
                gate: Mutex::new(()),
            }),
        }
    }

    /// Build the whole client stack from `config`.
    pub fn from_config(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        status_init: impl StatusInitOperation<S> + 'static,
        operation: impl AuthenticationOperation<S, C> + 'static,
    ) -> Result<Self> {
        let service = ServiceClient::from_config(config, transport, status_init)?;
        Ok(Self::with_config(service, operation, config))
    }

    pub fn service(&self) -> &ServiceClient<S> {
        &self.service
    }

    pub fn status(&self) -> Option<Arc<S>> {
        self.service.status()
    }

    pub async fn ensure_initialized(&self) -> Result<Arc<S>> {
        self.service.ensure_initialized().await
    }

    pub fn reset_status(&self) {
        self.service.reset_status()
    }

    pub fn set_status(&self, status: S) -> Arc<S> {
        self.service.set_status(status)
    }

    pub fn is_storing_enabled(&self) -> bool {
        self.auth.stored.lock().enabled
    }

    /// Turning storage off also drops any stored credentials.
    pub fn set_storing_enabled(&self, enabled: bool) {
        if self.auth.stored.lock().set_enabled(enabled).is_some() {
            debug!("storage disabled, stored credentials cleared");
        }
    }

    pub fn is_auto_renewal_enabled(&self) -> bool {
        self.auth.auto_renewal_enabled.load(Ordering::SeqCst)
    }

    pub fn set_auto_renewal_enabled(&self, enabled: bool) {
        self.auth.auto_renewal_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn max_renewal_attempts(&self) -> Option<u32> {
        self.auth.max_renewal_attempts
    }

    pub fn has_stored_credentials(&self) -> bool {
        self.auth.stored.lock().credentials.is_some()
    }

    pub fn clear_stored_credentials(&self) {
        if self.auth.stored.lock().credentials.take().is_some() {
            debug!("stored credentials cleared");
        }
    }

    /// Authenticate with `credentials`, storing them on success when storage
    /// is enabled.
    pub async fn authenticate_with(&self, credentials: C) -> Result<Arc<S>> {
        let _gate = self.auth.gate.lock().await;
        let status = self.run_authentication(&credentials).await?;
        if !self.auth.stored.lock().store(credentials) {
            debug!("credential storage disabled, credentials not kept");
        }
        Ok(status)
    }

    /// Authenticate again with the stored credentials.
    pub async fn authenticate(&self) -> Result<Arc<S>> {
        let _gate = self.auth.gate.lock().await;
        self.authenticate_stored().await
    }

    /// Return an authenticated status, logging in with the stored
    /// credentials if the cached status is not authenticated.
    pub async fn ensure_authenticated(&self) -> Result<Arc<S>> {
        let status = self.service.ensure_initialized().await?;
        if status.is_authenticated() {
            return Ok(status);
        }
        let _gate = self.auth.gate.lock().await;
        // Another caller may have logged in while we waited.
        if let Some(current) = self.service.status() {
            if current.is_authenticated() {
                return Ok(current);
            }
        }
        self.authenticate_stored().await
    }

    /// Drop the authentication held by the cached status, keeping the rest
    /// of the session.
    pub fn reset_authentication(&self) {
        if let Some(current) = self.service.status() {
            let mut status = (*current).clone();
            status.reset_authentication();
            self.service.set_status(status);
            debug!("authentication reset");
        }
    }

    /// Execute `op`, ensuring the context its `REQUIREMENT` asks for.
    /// Authenticated operations that report an expired session go through
    /// the auto-renewal policy when one applies.
    pub async fn execute<O>(&self, op: &O, params: &O::Params) -> Result<O::Output>
    where
        O: Operation<S>,
    {
        match O::REQUIREMENT {
            Requirement::Independent | Requirement::Status => self.service.execute(op, params).await,
            Requirement::Authenticated => self.execute_authenticated(op, params).await,
        }
    }

    async fn execute_authenticated<O>(&self, op: &O, params: &O::Params) -> Result<O::Output>
    where
        O: Operation<S>,
    {
        let status = self.ensure_authenticated().await?;
        match self.service.execute_with_status(op, params, &status).await {
            Err(err) if err.is_authentication_expired() => self.renew(op, params, status, err).await,
            other => other,
        }
    }

    async fn renew<O>(&self, op: &O, params: &O::Params, failed: Arc<S>, expired: ClientError) -> Result<O::Output>
    where
        O: Operation<S>,
    {
        if !self.is_auto_renewal_enabled() {
            debug!("authentication expired, auto-renewal disabled");
            return Err(expired);
        }
        let Some(policy) = self.auth.operation.auto_renewal_policy() else {
            debug!("authentication expired, no renewal policy");
            return Err(expired);
        };
        info!("authentication expired, applying renewal policy");
        renewal::run(self, policy.as_ref(), op, params, failed, expired).await
    }

    /// Re-login used by renewal. If another caller already replaced the
    /// rejected status with an authenticated one, that status is reused.
    pub(crate) async fn reauthenticate(&self, rejected: &Arc<S>) -> Result<Arc<S>> {
        let _gate = self.auth.gate.lock().await;
        if let Some(current) = self.service.status() {
            if !Arc::ptr_eq(&current, rejected) && current.is_authenticated() {
                debug!("status already renewed by another caller");
                return Ok(current);
            }
        }
        self.reset_authentication();
        self.authenticate_stored().await
    }

    pub(crate) async fn execute_with_status<O>(&self, op: &O, params: &O::Params, status: &S) -> Result<O::Output>
    where
        O: Operation<S>,
    {
        self.service.execute_with_status(op, params, status).await
    }

    /// Caller must hold the authentication gate.
    async fn authenticate_stored(&self) -> Result<Arc<S>> {
        let credentials = self
            .auth
            .stored
            .lock()
            .credentials
            .clone()
            .ok_or(ClientError::CredentialsNotStored)?;
        match self.run_authentication(&credentials).await {
            Err(err) if err.is_credentials_invalid() => {
                warn!("stored credentials rejected, clearing them");
                self.clear_stored_credentials();
                Err(err)
            }
            other => other,
        }
    }

    async fn run_authentication(&self, credentials: &C) -> Result<Arc<S>> {
        let current = self.service.ensure_initialized().await?;
        let mut status = (*current).clone();
        match self
            .auth
            .operation
            .authenticate(&self.service, credentials, &mut status)
            .await
        {
            Ok(()) => {
                info!("authenticated");
                Ok(self.service.set_status(status))
            }
            Err(err) => {
                warn!(error = %err, "authentication failed");
                Err(err)
            }
        }
    }
}
