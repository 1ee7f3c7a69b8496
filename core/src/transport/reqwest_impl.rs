use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::TransportError;
use crate::http::{BodySource, HttpMethod, HttpRequest, HttpResponse, ResponseBody, ResponseMeta};
use crate::transport::Transport;

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (timeouts, proxies, cookie store).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl BodySource for ReqwestBody {
    async fn read(self: Box<Self>) -> Result<Bytes, TransportError> {
        self.0
            .bytes()
            .await
            .map_err(|e| TransportError::with_source("failed to read response body", e))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            uri,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(to_reqwest_method(method), uri.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::with_source(format!("{method} {uri} failed"), e))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let meta = ResponseMeta {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
        };
        debug!(status = meta.status, %uri, "response received");

        let bodiless = method == HttpMethod::Head
            || status == reqwest::StatusCode::NO_CONTENT
            || status == reqwest::StatusCode::NOT_MODIFIED
            || response.content_length() == Some(0);
        let body = (!bodiless).then(|| ResponseBody::new(ReqwestBody(response)));

        Ok(HttpResponse { meta, body })
    }
}
