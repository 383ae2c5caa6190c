//! Typed, observable HTTP client core.
//!
//! # Overview
//! Build a URL with `UrlBuilder`, encode a body into a `Payload`, and hand
//! both to an `HttpClient` verb. The client stamps the request with an id
//! and the caller's refcode, dispatches it through a `Transport`, and
//! either returns the validated response (optionally decoded from JSON) or
//! a `MirageError` carrying the refcode, a clarification, details and the
//! underlying cause chain.
//!
//! # Design
//! - Errors share one diagnostic contract (`ErrorContext`); `MirageError`
//!   is the tagged union over the four kinds.
//! - The client's only shared state is its header map (mutex) and request
//!   id counter (atomic); share one client across threads with `Arc`.
//! - One attempt per call: no retries, no backoff.
//! - Logging goes through `tracing`; install a subscriber to see it.

pub mod auth;
pub mod client;
pub mod config;
pub mod csv;
pub mod error;
pub mod http;
pub mod json;
pub mod message;
pub mod payload;
pub mod status;
pub mod transport;
pub mod url_builder;

pub use auth::OAuthToken;
pub use client::HttpClient;
pub use config::ClientConfig;
pub use error::{
    CsvError, ErrorContext, HttpError, HttpErrorKind, JsonError, JsonFailure, JsonProcess,
    MirageError, UrlError, UrlErrorKind,
};
pub use http::{ClientRequest, ClientResponse, HttpMethod, LogOptions, PreparedRequest};
pub use json::JsonCoder;
pub use message::{Message, Severity};
pub use payload::{MultipartForm, MultipartPart, Payload, UrlEncodedForm};
pub use status::StatusCode;
pub use transport::{Exchange, RawResponse, Transport, TransportError, UreqTransport};
pub use url_builder::{QueryItem, QueryValue, RequestUrl, UrlBuilder};

pub use url::Url;
