//! Outgoing request description.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use std::time::Duration;
use url::Url;

use crate::{ReplayableBody, Result, TransportError};

/// A request executed by [`crate::Transport`], possibly several times.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: ReplayableBody,
    timeout: Option<Duration>,
}

impl HttpRequest {
    /// Start building a POST request.
    pub fn post(url: impl AsRef<str>) -> Result<HttpRequestBuilder> {
        Self::builder(Method::POST, url)
    }

    /// Start building a request with a custom method.
    pub fn builder(method: Method, url: impl AsRef<str>) -> Result<HttpRequestBuilder> {
        let url = Url::parse(url.as_ref())?;
        Ok(HttpRequestBuilder {
            request: Self {
                method,
                url,
                headers: HeaderMap::new(),
                body: ReplayableBody::empty(),
                timeout: None,
            },
        })
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Per-request timeout overriding the transport default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn body_mut(&mut self) -> &mut ReplayableBody {
        &mut self.body
    }
}

/// Builder for [`HttpRequest`].
#[derive(Debug)]
pub struct HttpRequestBuilder {
    request: HttpRequest,
}

impl HttpRequestBuilder {
    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes())
            .map_err(|e| TransportError::RequestBuild(e.to_string()))?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| TransportError::RequestBuild(e.to_string()))?;
        self.request.headers.insert(name, value);
        Ok(self)
    }

    /// Set several headers, replacing previous values of the same name.
    pub fn headers<I, K, V>(mut self, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name, value)?;
        }
        Ok(self)
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<ReplayableBody>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Set a per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Finish building.
    pub fn build(self) -> HttpRequest {
        self.request
    }
}
