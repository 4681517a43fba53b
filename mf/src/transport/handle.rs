//! Caller-built HTTP request handle

use std::time::Duration;

use reqwest::Method;
use tracing::debug;

/// A reusable HTTP request description
///
/// Built by the caller and handed to the scheduler as an opaque handle. When
/// auto-close is disabled the scheduler gives it back with the response so it
/// can be submitted again.
#[derive(Debug, Clone)]
pub struct HttpHandle {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Deadline for this request alone
    pub timeout: Option<Duration>,
    /// Prefix the response content with the rendered response head
    pub include_headers: bool,
}

impl HttpHandle {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            include_headers: true,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::POST, url).body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn include_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    /// Build the reqwest request this handle describes
    pub(crate) fn build(&self, client: &reqwest::Client) -> Result<reqwest::Request, reqwest::Error> {
        debug!(method = %self.method, url = %self.url, "HttpHandle::build: called");
        let mut builder = client.request(self.method.clone(), self.url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            debug!(len = body.len(), "HttpHandle::build: attaching body");
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}
