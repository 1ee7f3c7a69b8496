//! HTTP request and response types exchanged with the transport.
//!
//! # Design
//! Requests are plain data: the executor resolves the URI, the operation
//! writes headers and body into the `HttpRequest`, and the `Transport` turns
//! it into network I/O. Responses carry their body as a lazy `ResponseBody`
//! so the executor decides whether to read it (acceptable status) or discard
//! it (status failure) without the transport knowing which.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::error::{ClientError, TransportError};
use crate::operation::json;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data, addressed by an absolute URI.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub uri: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header. Repeated names are kept in insertion order.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer_auth(&mut self, token: &str) -> &mut Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json_body<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, ClientError> {
        self.body = Some(json::encode(value)?);
        Ok(self.header("content-type", "application/json"))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Check every header name and value against the HTTP grammar.
    pub fn validate_headers(&self) -> Result<(), ClientError> {
        for (name, value) in &self.headers {
            let invalid = |reason: String| ClientError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            ::http::HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            ::http::HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// Supplier of a response body, consumed at most once.
#[async_trait]
pub trait BodySource: Send {
    /// Read the whole body into memory.
    async fn read(self: Box<Self>) -> Result<Bytes, TransportError>;

    /// Release the body without using it. Defaults to reading and dropping it
    /// so the underlying connection can be reused.
    async fn discard(self: Box<Self>) -> Result<(), TransportError> {
        self.read().await.map(drop)
    }
}

#[async_trait]
impl BodySource for Bytes {
    async fn read(self: Box<Self>) -> Result<Bytes, TransportError> {
        Ok(*self)
    }

    async fn discard(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A response body handed over by the transport.
pub struct ResponseBody(Box<dyn BodySource>);

impl ResponseBody {
    pub fn new(source: impl BodySource + 'static) -> Self {
        Self(Box::new(source))
    }

    /// Body already held in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes.into())
    }

    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        self.0.read().await
    }

    pub async fn discard(self) -> Result<(), TransportError> {
        self.0.discard().await
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody(..)")
    }
}

/// Status line and headers of a response, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            headers: Vec::new(),
        }
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An HTTP response as returned by a `Transport`.
#[derive(Debug)]
pub struct HttpResponse {
    pub meta: ResponseMeta,
    /// `None` when the response carries no body at all.
    pub body: Option<ResponseBody>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            meta: ResponseMeta::new(status),
            body: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.meta.reason = Some(reason.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status(&self) -> u16 {
        self.meta.status
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
