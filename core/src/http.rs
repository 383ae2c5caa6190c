//! Request and response records.
//!
//! # Design
//! `PreparedRequest` is what callers assemble; it may still be missing a
//! URL. `ClientRequest` is what the client actually dispatches: an
//! immutable record stamped with an id, a refcode, the merged headers and a
//! creation time. `ClientResponse` is the immutable snapshot of whatever came
//! back, built after every dispatch so failures can carry it.
//!
//! All fields are owned so records can be moved into errors freely.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::payload::Payload;
use crate::status::StatusCode;
use crate::url_builder::RequestUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which parts of an exchange get logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub request_summary: bool,
    pub request_body: bool,
    pub response_summary: bool,
    pub response_body: bool,
}

impl LogOptions {
    pub const NONE: LogOptions = LogOptions {
        request_summary: false,
        request_body: false,
        response_summary: false,
        response_body: false,
    };

    pub const SUMMARY: LogOptions = LogOptions {
        request_summary: true,
        request_body: false,
        response_summary: true,
        response_body: false,
    };

    pub const VERBOSE: LogOptions = LogOptions {
        request_summary: true,
        request_body: true,
        response_summary: true,
        response_body: true,
    };

    /// `none`, `summary` or `verbose`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::NONE),
            "summary" => Some(Self::SUMMARY),
            "verbose" | "all" => Some(Self::VERBOSE),
            _ => None,
        }
    }
}

/// Hands out request ids. After `u64::MAX - 1` the counter wraps to 0.
#[derive(Debug, Default)]
pub struct RequestIdCounter {
    next: AtomicU64,
}

impl RequestIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(id: u64) -> Self {
        Self {
            next: AtomicU64::new(id),
        }
    }

    pub fn next_id(&self) -> u64 {
        let advance = |id: u64| Some(if id >= u64::MAX - 1 { 0 } else { id + 1 });
        match self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, advance)
        {
            Ok(id) | Err(id) => id,
        }
    }
}

/// A request as assembled by the caller, before the client stamps it.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Option<RequestUrl>,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
    pub timeout: Option<Duration>,
    pub log_options: Option<LogOptions>,
}

impl PreparedRequest {
    pub fn new(method: HttpMethod, url: impl Into<Option<RequestUrl>>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            payload: Payload::empty(),
            timeout: None,
            log_options: None,
        }
    }

    /// Replaces any existing header with the same (case-insensitive) name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.log_options = Some(options);
        self
    }

    pub fn accepting_json(self) -> Self {
        self.with_header("Accept", crate::payload::JSON)
    }
}

/// A dispatched request. Immutable once created.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    id: u64,
    refcode: String,
    method: HttpMethod,
    url: RequestUrl,
    headers: Vec<(String, String)>,
    timeout: Duration,
    payload: Payload,
    created: DateTime<Utc>,
    log_options: Option<LogOptions>,
}

impl ClientRequest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        refcode: &str,
        method: HttpMethod,
        url: RequestUrl,
        headers: Vec<(String, String)>,
        timeout: Duration,
        payload: Payload,
        log_options: Option<LogOptions>,
    ) -> Self {
        Self {
            id,
            refcode: refcode.to_string(),
            method,
            url,
            headers,
            timeout,
            payload,
            created: Utc::now(),
            log_options,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn refcode(&self) -> &str {
        &self.refcode
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &RequestUrl {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn log_options(&self) -> Option<LogOptions> {
        self.log_options
    }

    /// `#id METHOD url (summary)`
    pub fn summary(&self) -> String {
        format!(
            "#{} {} {} ({})",
            self.id,
            self.method,
            self.url,
            self.payload.summary()
        )
    }
}

/// Snapshot of a completed exchange.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    request_id: u64,
    refcode: String,
    request_created: DateTime<Utc>,
    status: Option<StatusCode>,
    raw_status: Option<u16>,
    headers: BTreeMap<String, String>,
    data: Vec<u8>,
    completed: DateTime<Utc>,
}

impl ClientResponse {
    /// Header names are lowercased; values that are not valid UTF-8 are
    /// dropped. `raw_status` is `None` when the exchange was not HTTP.
    pub fn new(
        request: &ClientRequest,
        raw_status: Option<u16>,
        headers: Vec<(String, Vec<u8>)>,
        data: Vec<u8>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .filter_map(|(name, value)| {
                String::from_utf8(value)
                    .ok()
                    .map(|value| (name.to_ascii_lowercase(), value))
            })
            .collect();
        Self {
            request_id: request.id(),
            refcode: request.refcode().to_string(),
            request_created: request.created(),
            status: raw_status.and_then(StatusCode::from_u16),
            raw_status,
            headers,
            data,
            completed: Utc::now(),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn refcode(&self) -> &str {
        &self.refcode
    }

    pub fn request_created(&self) -> DateTime<Utc> {
        self.request_created
    }

    /// `None` when the status is outside the known set.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn raw_status(&self) -> Option<u16> {
        self.raw_status
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn completed(&self) -> DateTime<Utc> {
        self.completed
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.completed - self.request_created
    }

    pub fn is_success(&self) -> bool {
        self.status.is_some_and(StatusCode::is_success)
    }

    pub fn summary(&self) -> String {
        let status = match (self.status, self.raw_status) {
            (Some(status), _) => status.to_string(),
            (None, Some(code)) => format!("{code} (unrecognized)"),
            (None, None) => "no HTTP status".to_string(),
        };
        format!(
            "#{} {} ({} bytes, {} ms)",
            self.request_id,
            status,
            self.data.len(),
            self.elapsed().num_milliseconds()
        )
    }
}
