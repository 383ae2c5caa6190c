//! Error taxonomy for the HTTP core.
//!
//! # Design
//! Four unrelated failure kinds share one diagnostic contract: a refcode that
//! correlates the error with its call site, an optional alert title, a
//! user-facing clarification, developer-facing details, a recovery hint, the
//! chain of underlying causes, and a free-form `user_info` map for callers
//! that handle errors programmatically. The shared fields live in
//! `ErrorContext`; each concrete kind embeds one and `MirageError` is the
//! tagged union callers match on.
//!
//! Errors are assembled with `with_*` methods at the point of detection and
//! never touched again once returned.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::{ClientRequest, ClientResponse};
use crate::status::StatusCode;

/// A shared, type-erased underlying cause.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Diagnostic fields common to every error kind.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub refcode: Option<String>,
    pub alert_title: Option<String>,
    pub clarification: Option<String>,
    pub details: Option<String>,
    pub recovery: Option<String>,
    pub underlying: Vec<Cause>,
    pub user_info: BTreeMap<String, serde_json::Value>,
}

impl ErrorContext {
    /// Summary derived from the refcode, when one was supplied.
    pub fn refcode_summary(&self) -> Option<String> {
        self.refcode
            .as_deref()
            .map(|refcode| format!("Error reference {refcode}"))
    }
}

macro_rules! diagnostic_fields {
    ($($ty:ident),+ $(,)?) => {$(
        impl $ty {
            pub fn context(&self) -> &ErrorContext {
                &self.context
            }

            pub fn refcode(&self) -> Option<&str> {
                self.context.refcode.as_deref()
            }

            pub fn clarification(&self) -> Option<&str> {
                self.context.clarification.as_deref()
            }

            pub fn details(&self) -> Option<&str> {
                self.context.details.as_deref()
            }

            /// Refcode-based summary, falling back to the error's own message.
            pub fn summary(&self) -> String {
                self.context
                    .refcode_summary()
                    .unwrap_or_else(|| self.to_string())
            }

            pub fn with_refcode(mut self, refcode: impl Into<String>) -> Self {
                self.context.refcode = Some(refcode.into());
                self
            }

            pub fn with_alert_title(mut self, title: impl Into<String>) -> Self {
                self.context.alert_title = Some(title.into());
                self
            }

            pub fn with_clarification(mut self, clarification: impl Into<String>) -> Self {
                self.context.clarification = Some(clarification.into());
                self
            }

            pub fn with_details(mut self, details: impl Into<String>) -> Self {
                self.context.details = Some(details.into());
                self
            }

            pub fn with_recovery(mut self, recovery: impl Into<String>) -> Self {
                self.context.recovery = Some(recovery.into());
                self
            }

            pub fn with_cause<E>(self, cause: E) -> Self
            where
                E: std::error::Error + Send + Sync + 'static,
            {
                self.with_shared_cause(Arc::new(cause))
            }

            /// Appends to the cause chain. The first cause becomes `source()`.
            pub fn with_shared_cause(mut self, cause: Cause) -> Self {
                if self.source.is_none() {
                    self.source = Some(Arc::clone(&cause));
                }
                self.context.underlying.push(cause);
                self
            }

            pub fn with_user_info(
                mut self,
                key: impl Into<String>,
                value: impl Into<serde_json::Value>,
            ) -> Self {
                self.context.user_info.insert(key.into(), value.into());
                self
            }
        }
    )+};
}

diagnostic_fields!(UrlError, JsonError, HttpError, CsvError);

// ---------------------------------------------------------------------------
// URL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlErrorKind {
    MissingScheme,
    MissingHost,
    Invalid,
}

impl fmt::Display for UrlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlErrorKind::MissingScheme => write!(f, "URL is missing a scheme"),
            UrlErrorKind::MissingHost => write!(f, "URL is missing a host"),
            UrlErrorKind::Invalid => write!(f, "URL is invalid"),
        }
    }
}

/// URL parsing or construction failed.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct UrlError {
    kind: UrlErrorKind,
    context: ErrorContext,
    #[source]
    source: Option<Cause>,
}

impl UrlError {
    pub fn new(kind: UrlErrorKind) -> Self {
        Self {
            kind,
            context: ErrorContext::default(),
            source: None,
        }
    }

    pub fn kind(&self) -> UrlErrorKind {
        self.kind
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Which direction of (de)serialization failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonProcess {
    Encode,
    Decode,
}

impl fmt::Display for JsonProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonProcess::Encode => write!(f, "encode"),
            JsonProcess::Decode => write!(f, "decode"),
        }
    }
}

/// What went wrong inside the JSON machinery, when it can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonFailure {
    CorruptedData,
    KeyNotFound { key: String },
    ValueNotFound,
    TypeMismatch,
    Other,
}

impl fmt::Display for JsonFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonFailure::CorruptedData => write!(f, "data is corrupted"),
            JsonFailure::KeyNotFound { key } => write!(f, "key `{key}` not found"),
            JsonFailure::ValueNotFound => write!(f, "value not found"),
            JsonFailure::TypeMismatch => write!(f, "type mismatch"),
            JsonFailure::Other => write!(f, "unexpected failure"),
        }
    }
}

/// JSON encoding or decoding failed.
#[derive(Debug, Error)]
#[error("JSON {process} failed: {failure}")]
pub struct JsonError {
    process: JsonProcess,
    failure: JsonFailure,
    json_text: Option<String>,
    context: ErrorContext,
    #[source]
    source: Option<Cause>,
}

impl JsonError {
    pub fn new(process: JsonProcess, failure: JsonFailure) -> Self {
        Self {
            process,
            failure,
            json_text: None,
            context: ErrorContext::default(),
            source: None,
        }
    }

    pub fn process(&self) -> JsonProcess {
        self.process
    }

    pub fn failure(&self) -> &JsonFailure {
        &self.failure
    }

    /// The offending document, recovered as (lossy) UTF-8.
    pub fn json_text(&self) -> Option<&str> {
        self.json_text.as_deref()
    }

    pub fn with_json_text(mut self, data: &[u8]) -> Self {
        self.json_text = Some(String::from_utf8_lossy(data).into_owned());
        self
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// A pre-built request carried no URL; nothing was sent.
    MissingUrl,
    /// DNS, TLS, connection, or timeout failure below HTTP.
    Transport,
    /// The exchange completed but did not produce an HTTP response.
    NotHttpResponse,
    /// The server answered with a status code outside the known set.
    UnrecognizedStatus(u16),
    /// A known, non-2xx status.
    Unsuccessful(StatusCode),
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpErrorKind::MissingUrl => write!(f, "request has no URL"),
            HttpErrorKind::Transport => write!(f, "request could not be delivered"),
            HttpErrorKind::NotHttpResponse => write!(f, "response is not an HTTP response"),
            HttpErrorKind::UnrecognizedStatus(code) => {
                write!(f, "unrecognized HTTP status code {code}")
            }
            HttpErrorKind::Unsuccessful(status) => write!(f, "HTTP {status}"),
        }
    }
}

/// An HTTP call failed.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct HttpError {
    kind: HttpErrorKind,
    request: Option<Box<ClientRequest>>,
    response: Option<Box<ClientResponse>>,
    time_range: Option<Range<DateTime<Utc>>>,
    context: ErrorContext,
    #[source]
    source: Option<Cause>,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind) -> Self {
        Self {
            kind,
            request: None,
            response: None,
            time_range: None,
            context: ErrorContext::default(),
            source: None,
        }
    }

    pub fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn request(&self) -> Option<&ClientRequest> {
        self.request.as_deref()
    }

    pub fn response(&self) -> Option<&ClientResponse> {
        self.response.as_deref()
    }

    /// Recognized status of the failed response.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().and_then(|r| r.status())
    }

    /// Numeric status as received, recognized or not.
    pub fn raw_status(&self) -> Option<u16> {
        self.response.as_ref().and_then(|r| r.raw_status())
    }

    /// Response body bytes, if a response arrived.
    pub fn data(&self) -> Option<&[u8]> {
        self.response.as_ref().map(|r| r.data())
    }

    /// From request creation to response completion.
    pub fn time_range(&self) -> Option<&Range<DateTime<Utc>>> {
        self.time_range.as_ref()
    }

    pub fn with_request(mut self, request: ClientRequest) -> Self {
        self.request = Some(Box::new(request));
        self
    }

    pub fn with_response(mut self, response: ClientResponse) -> Self {
        self.time_range = Some(response.request_created()..response.completed());
        self.response = Some(Box::new(response));
        self
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Writing a CSV export failed.
#[derive(Debug, Error)]
#[error("failed to write {byte_count} bytes of CSV to {}", .path.display())]
pub struct CsvError {
    path: PathBuf,
    filename: String,
    byte_count: usize,
    context: ErrorContext,
    #[source]
    source: Option<Cause>,
}

impl CsvError {
    pub fn new(path: &Path, byte_count: usize) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            filename,
            byte_count,
            context: ErrorContext::default(),
            source: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn byte_count(&self) -> usize {
        self.byte_count
    }
}

// ---------------------------------------------------------------------------
// Union
// ---------------------------------------------------------------------------

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum MirageError {
    #[error(transparent)]
    Url(#[from] UrlError),

    #[error(transparent)]
    Json(#[from] JsonError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Csv(#[from] CsvError),
}

impl MirageError {
    pub fn context(&self) -> &ErrorContext {
        match self {
            MirageError::Url(e) => e.context(),
            MirageError::Json(e) => e.context(),
            MirageError::Http(e) => e.context(),
            MirageError::Csv(e) => e.context(),
        }
    }

    pub fn refcode(&self) -> Option<&str> {
        self.context().refcode.as_deref()
    }

    pub fn alert_title(&self) -> Option<&str> {
        self.context().alert_title.as_deref()
    }

    pub fn clarification(&self) -> Option<&str> {
        self.context().clarification.as_deref()
    }

    pub fn details(&self) -> Option<&str> {
        self.context().details.as_deref()
    }

    pub fn recovery(&self) -> Option<&str> {
        self.context().recovery.as_deref()
    }

    pub fn underlying(&self) -> &[Cause] {
        &self.context().underlying
    }

    pub fn user_info(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context().user_info
    }

    pub fn summary(&self) -> String {
        self.context()
            .refcode_summary()
            .unwrap_or_else(|| self.to_string())
    }

    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            MirageError::Http(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonError> {
        match self {
            MirageError::Json(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&UrlError> {
        match self {
            MirageError::Url(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::*;

    #[test]
    fn summary_prefers_refcode() {
        let err = UrlError::new(UrlErrorKind::MissingHost).with_refcode("U-17");
        assert_eq!(err.summary(), "Error reference U-17");

        let bare = UrlError::new(UrlErrorKind::MissingHost);
        assert_eq!(bare.summary(), "URL is missing a host");
    }

    #[test]
    fn first_cause_becomes_source() {
        let err = HttpError::new(HttpErrorKind::Transport)
            .with_cause(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            .with_cause(io::Error::new(io::ErrorKind::Other, "second"));

        assert_eq!(err.context().underlying.len(), 2);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("refused"));
    }

    #[test]
    fn union_exposes_shared_fields() {
        let err: MirageError = JsonError::new(JsonProcess::Decode, JsonFailure::TypeMismatch)
            .with_refcode("J-1")
            .with_clarification("The data received could not be read.")
            .with_details("expected a string")
            .with_recovery("Try again later.")
            .with_alert_title("Data Error")
            .with_user_info("type", "Note")
            .into();

        assert_eq!(err.refcode(), Some("J-1"));
        assert_eq!(err.alert_title(), Some("Data Error"));
        assert_eq!(err.clarification(), Some("The data received could not be read."));
        assert_eq!(err.details(), Some("expected a string"));
        assert_eq!(err.recovery(), Some("Try again later."));
        assert_eq!(err.user_info()["type"], "Note");
        assert!(err.underlying().is_empty());
        assert_eq!(err.to_string(), "JSON decode failed: type mismatch");
        assert!(err.as_json().is_some());
        assert!(err.as_http().is_none());
    }

    #[test]
    fn csv_error_records_filename() {
        let err = CsvError::new(Path::new("/tmp/export/report.csv"), 42);
        assert_eq!(err.filename(), "report.csv");
        assert_eq!(err.byte_count(), 42);
        assert_eq!(
            err.to_string(),
            "failed to write 42 bytes of CSV to /tmp/export/report.csv"
        );
    }

    #[test]
    fn http_kind_messages() {
        assert_eq!(
            HttpError::new(HttpErrorKind::Unsuccessful(StatusCode::NotFound)).to_string(),
            "HTTP 404 Not Found"
        );
        assert_eq!(
            HttpError::new(HttpErrorKind::UnrecognizedStatus(599)).to_string(),
            "unrecognized HTTP status code 599"
        );
    }
}
