//! The network seam.
//!
//! # Design
//! `HttpClient` never talks to the network directly; it hands a finished
//! `ClientRequest` to a `Transport` and gets back an `Exchange`. The default
//! transport is a ureq agent configured to return 4xx/5xx responses as data,
//! so status interpretation stays with the client. Tests substitute their
//! own transport to produce exchanges a real server never would.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;
use crate::http::ClientRequest;

/// Raw HTTP response as read off the wire.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

/// Outcome of a dispatch that reached the other side.
#[derive(Debug, Clone)]
pub enum Exchange {
    Http(RawResponse),
    /// Something answered, but not with an HTTP response.
    Other { description: String, body: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Ureq(#[from] ureq::Error),

    #[error("malformed request: {0}")]
    Request(String),

    #[error("{0}")]
    Other(String),
}

pub trait Transport: Send + Sync + fmt::Debug {
    fn dispatch(&self, request: &ClientRequest) -> Result<Exchange, TransportError>;
}

#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    default_timeout: Duration,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            agent: agent_with_timeout(config.timeout()),
            default_timeout: config.timeout(),
        }
    }

    fn agent_for(&self, timeout: Duration) -> ureq::Agent {
        if timeout == self.default_timeout {
            self.agent.clone()
        } else {
            agent_with_timeout(timeout)
        }
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

impl Transport for UreqTransport {
    fn dispatch(&self, request: &ClientRequest) -> Result<Exchange, TransportError> {
        let agent = self.agent_for(request.timeout());

        let mut builder = ureq::http::Request::builder()
            .method(request.method().as_str())
            .uri(request.url().as_str());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let payload = request.payload();
        let mut response = if payload.is_empty() {
            let http_request = builder
                .body(())
                .map_err(|e| TransportError::Request(e.to_string()))?;
            agent.run(http_request)?
        } else {
            let http_request = builder
                .body(payload.data().to_vec())
                .map_err(|e| TransportError::Request(e.to_string()))?;
            agent.run(http_request)?
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        // The whole body is buffered; lift ureq's default 10 MiB cap.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()?;
        debug!(id = request.id(), status, bytes = body.len(), "exchange complete");

        Ok(Exchange::Http(RawResponse {
            status,
            headers,
            body,
        }))
    }
}
