//! Wire transport seam.
//!
//! Every network call the engine makes goes through the [`Transport`] trait,
//! so the protocol logic never touches an HTTP client directly and tests can
//! substitute an in-memory fabric. [`HttpTransport`] is the reqwest-backed
//! implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::config::REQUEST_TIMEOUT_SECS;

/// Failure before an HTTP status was obtained (DNS, connect, timeout).
///
/// Status codes are not faults; they come back in [`TransportResponse`] and
/// the engine decides what each one means for the operation at hand.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct TransportFault {
    pub reason: String,
}

impl TransportFault {
    pub fn new(reason: impl Into<String>) -> Self {
        TransportFault {
            reason: reason.into(),
        }
    }
}

/// Response from a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        TransportResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP verbs used by the wire protocol.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> std::result::Result<TransportResponse, TransportFault>;

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> std::result::Result<TransportResponse, TransportFault>;

    async fn put(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> std::result::Result<TransportResponse, TransportFault>;
}

/// Production transport over reqwest with a per-request timeout.
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport {
            client: Client::new(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        HttpTransport {
            client: Client::new(),
            timeout,
        }
    }

    async fn execute(
        &self,
        mut request: reqwest::RequestBuilder,
        headers: &[(&str, &str)],
    ) -> std::result::Result<TransportResponse, TransportFault> {
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TransportFault::new(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFault::new(e.to_string()))?
            .to_vec();
        Ok(TransportResponse { status, body })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> std::result::Result<TransportResponse, TransportFault> {
        self.execute(self.client.get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> std::result::Result<TransportResponse, TransportFault> {
        self.execute(self.client.post(url).body(body.to_owned()), headers)
            .await
    }

    async fn put(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> std::result::Result<TransportResponse, TransportFault> {
        self.execute(self.client.put(url).body(body.to_owned()), headers)
            .await
    }
}
