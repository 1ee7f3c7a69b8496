//! Auto-renewal of expired authentication.
//!
//! # Design
//! When an authenticated call fails with `AuthenticationExpired`, the client
//! hands a `Renewal` to the authentication operation's policy. The policy
//! drives the recovery itself: it may re-authenticate, retry the original
//! operation against the refreshed status, or give up. The call's outcome is
//! written to a one-shot sink, so it resolves exactly once:
//!
//! - a successful `retry` resolves it with the operation output;
//! - `fail` resolves it with an error;
//! - a policy returning `Err` with the sink still open resolves it with that
//!   error, and returning `Ok` without resolving yields `RenewalUnresolved`.
//!
//! `max_renewal_attempts` caps both re-authentications and retries; `None`
//! leaves the number of rounds entirely to the policy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::auth::{AuthenticatedClient, Credentials};
use crate::error::{ClientError, Result};
use crate::operation::Operation;
use crate::status::AuthenticableStatus;

/// Steps available to a renewal policy for one expired call.
#[async_trait]
pub trait Renewal<S: AuthenticableStatus>: Send {
    /// Log in again with the stored credentials and return the new status.
    async fn reauthenticate(&mut self) -> Result<Arc<S>>;

    /// Re-run the original operation against `status`. On success the call
    /// is resolved with the operation output; on failure the error is
    /// returned to the policy and the call stays open.
    async fn retry(&mut self, status: Arc<S>) -> Result<()>;

    /// Resolve the call with `error`.
    fn fail(&mut self, error: ClientError) -> Result<()>;

    /// Retries performed so far.
    fn attempts(&self) -> u32;

    fn is_resolved(&self) -> bool;
}

/// Strategy invoked when an authenticated call reports an expired session.
#[async_trait]
pub trait AutoRenewalPolicy<S: AuthenticableStatus>: Send + Sync {
    async fn apply(&self, renewal: &mut dyn Renewal<S>, expired: ClientError) -> Result<()>;
}

/// Re-authenticate, then retry, for up to `rounds` rounds while the retry
/// keeps reporting an expired session.
#[derive(Debug, Clone, Copy)]
pub struct ReauthenticateAndRetry {
    rounds: u32,
}

impl ReauthenticateAndRetry {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl Default for ReauthenticateAndRetry {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl<S: AuthenticableStatus> AutoRenewalPolicy<S> for ReauthenticateAndRetry {
    async fn apply(&self, renewal: &mut dyn Renewal<S>, expired: ClientError) -> Result<()> {
        let mut last = expired;
        for _ in 0..self.rounds {
            let status = renewal.reauthenticate().await?;
            match renewal.retry(status).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_authentication_expired() => last = err,
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }
}

struct RenewalAttempt<'a, S, C, O>
where
    S: AuthenticableStatus,
    C: Credentials,
    O: Operation<S>,
{
    client: &'a AuthenticatedClient<S, C>,
    op: &'a O,
    params: &'a O::Params,
    rejected: Arc<S>,
    sink: Option<oneshot::Sender<Result<O::Output>>>,
    max_attempts: Option<u32>,
    attempts: u32,
    reauthentications: u32,
}

impl<S, C, O> RenewalAttempt<'_, S, C, O>
where
    S: AuthenticableStatus,
    C: Credentials,
    O: Operation<S>,
{
    fn resolve(&mut self, outcome: Result<O::Output>) -> Result<()> {
        let sink = self.sink.take().ok_or(ClientError::SinkAlreadyResolved)?;
        // The receiver lives until the policy returns.
        let _ = sink.send(outcome);
        Ok(())
    }

    fn check_budget(&self, used: u32) -> Result<()> {
        match self.max_attempts {
            Some(max) if used >= max => {
                warn!(attempts = used, "renewal attempts exhausted");
                Err(ClientError::RenewalExhausted { attempts: used })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<'a, S, C, O> Renewal<S> for RenewalAttempt<'a, S, C, O>
where
    S: AuthenticableStatus,
    C: Credentials,
    O: Operation<S>,
{
    async fn reauthenticate(&mut self) -> Result<Arc<S>> {
        self.check_budget(self.reauthentications)?;
        self.reauthentications += 1;
        let status = self.client.reauthenticate(&self.rejected).await?;
        self.rejected = status.clone();
        Ok(status)
    }

    async fn retry(&mut self, status: Arc<S>) -> Result<()> {
        if self.sink.is_none() {
            return Err(ClientError::SinkAlreadyResolved);
        }
        self.check_budget(self.attempts)?;
        self.attempts += 1;
        debug!(attempt = self.attempts, "retrying operation after renewal");
        match self.client.execute_with_status(self.op, self.params, &status).await {
            Ok(output) => self.resolve(Ok(output)),
            Err(err) => {
                if err.is_authentication_expired() {
                    self.rejected = status;
                }
                Err(err)
            }
        }
    }

    fn fail(&mut self, error: ClientError) -> Result<()> {
        self.resolve(Err(error))
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn is_resolved(&self) -> bool {
        self.sink.is_none()
    }
}

/// Hand an expired call to `policy` and collect its single outcome.
pub(crate) async fn run<S, C, O>(
    client: &AuthenticatedClient<S, C>,
    policy: &dyn AutoRenewalPolicy<S>,
    op: &O,
    params: &O::Params,
    rejected: Arc<S>,
    expired: ClientError,
) -> Result<O::Output>
where
    S: AuthenticableStatus,
    C: Credentials,
    O: Operation<S>,
{
    let (sink, outcome) = oneshot::channel();
    let mut attempt = RenewalAttempt {
        client,
        op,
        params,
        rejected,
        sink: Some(sink),
        max_attempts: client.max_renewal_attempts(),
        attempts: 0,
        reauthentications: 0,
    };

    if let Err(err) = policy.apply(&mut attempt, expired).await {
        if attempt.fail(err).is_err() {
            warn!("renewal policy failed after resolving the call; keeping the resolved outcome");
        }
    }
    drop(attempt);

    outcome.await.unwrap_or(Err(ClientError::RenewalUnresolved))
}
