//! Request/response pipeline shared by every operation kind.
//!
//! `Executor::run` is the status-independent pipeline: resolve the URI, let
//! the operation write the request, submit it, then classify, parse and map
//! the response. Callers that need a status pass it in; the executor never
//! touches client state.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::operation::Operation;
use crate::transport::Transport;

pub(crate) struct Executor {
    base_uri: Url,
    transport: Arc<dyn Transport>,
}

impl Executor {
    pub(crate) fn new(base_uri: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let parsed = Url::parse(base_uri).map_err(|e| ClientError::InvalidBaseUri {
            uri: base_uri.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUri {
                uri: base_uri.to_string(),
                reason: "URI cannot be used as a base".to_string(),
            });
        }
        Ok(Self {
            base_uri: parsed,
            transport,
        })
    }

    pub(crate) fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// Resolve an operation URI against the base URI (RFC 3986 reference
    /// resolution: relative paths extend the base directory, absolute paths
    /// replace the base path, absolute URIs pass through).
    pub(crate) fn resolve(&self, uri: &str) -> Result<Url> {
        self.base_uri.join(uri).map_err(|e| ClientError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
    }

    /// Build the request without contacting the transport.
    pub(crate) fn build_request<S, O>(&self, op: &O, params: &O::Params, status: Option<&S>) -> Result<HttpRequest>
    where
        O: Operation<S>,
    {
        let uri = self.resolve(&op.uri(params, status)?)?;
        let mut request = HttpRequest::new(op.method(), uri);
        op.prepare(&mut request, params, status)?;
        request.validate_headers()?;
        Ok(request)
    }

    pub(crate) async fn run<S, O>(&self, op: &O, params: &O::Params, status: Option<&S>) -> Result<O::Output>
    where
        S: Sync,
        O: Operation<S>,
    {
        let request = self.build_request(op, params, status)?;
        debug!(method = %request.method, uri = %request.uri, "executing request");

        let HttpResponse { meta, body } = self.transport.execute(request).await?;

        if !op.accepts(meta.status) {
            debug!(status = meta.status, "response status not accepted");
            if let Some(body) = body {
                if let Err(e) = body.discard().await {
                    warn!(status = meta.status, error = %e, "failed to discard response body");
                }
            }
            return op.translate_status(&meta, params);
        }

        let entity = match body {
            Some(body) => Some(op.parse(body.bytes().await?)?),
            None => None,
        };
        op.build_result(entity, params, &meta)
    }
}
