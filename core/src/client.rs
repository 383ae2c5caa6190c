//! HTTP client: stamps requests, dispatches them, validates responses.
//!
//! # Design
//! `HttpClient` is shared across threads behind an `Arc`. The only mutable
//! state is the map of headers added to every request (user agent, bearer
//! authorization, caller extras), guarded by a mutex that is never held
//! across a dispatch, and the request-id counter, which is atomic and
//! independent of that lock.
//!
//! Every verb funnels into `request`, which:
//! 1. stamps a `ClientRequest` (id, refcode, merged headers, timeout),
//! 2. hands it to the `Transport`,
//! 3. snapshots the result as a `ClientResponse`,
//! 4. accepts it only if it is HTTP, carries a known status, and that
//!    status is 2xx.
//!
//! Each rejection is a distinct `HttpError` carrying the request and the
//! response snapshot. Nothing is retried.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::auth::OAuthToken;
use crate::config::ClientConfig;
use crate::error::{HttpError, HttpErrorKind, MirageError};
use crate::http::{ClientRequest, ClientResponse, HttpMethod, PreparedRequest, RequestIdCounter};
use crate::json::JsonCoder;
use crate::payload::{MultipartForm, Payload, UrlEncodedForm};
use crate::status::StatusCode;
use crate::transport::{Exchange, Transport, UreqTransport};
use crate::url_builder::RequestUrl;

/// Longest body excerpt copied into error details.
const DETAIL_EXCERPT: usize = 512;

#[derive(Debug)]
pub struct HttpClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    headers: Mutex<BTreeMap<String, String>>,
    coder: JsonCoder,
    ids: RequestIdCounter,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(&config));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(agent) = &config.user_agent {
            headers.insert("user-agent".to_string(), agent.clone());
        }
        let coder = if config.pretty_json {
            JsonCoder::pretty()
        } else {
            JsonCoder::new()
        };
        Self {
            config,
            transport,
            headers: Mutex::new(headers),
            coder,
            ids: RequestIdCounter::new(),
        }
    }

    /// Replace the id counter, e.g. to resume numbering.
    pub fn with_request_ids(mut self, ids: RequestIdCounter) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn coder(&self) -> &JsonCoder {
        &self.coder
    }

    // -----------------------------------------------------------------------
    // Headers
    // -----------------------------------------------------------------------

    fn lock_headers(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.headers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the headers added to every request (names lowercased).
    pub fn headers(&self) -> BTreeMap<String, String> {
        self.lock_headers().clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.lock_headers().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        self.lock_headers()
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove_header(&self, name: &str) -> Option<String> {
        self.lock_headers().remove(&name.to_ascii_lowercase())
    }

    /// Sets `Authorization: Bearer …` from the token, or removes it for `None`.
    pub fn set_authorization(&self, token: Option<&OAuthToken>) {
        match token {
            Some(token) => self.set_header("authorization", token.authorization_value()),
            None => {
                self.remove_header("authorization");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Send a request and return the validated response.
    pub fn request(
        &self,
        prepared: PreparedRequest,
        refcode: &str,
    ) -> Result<ClientResponse, MirageError> {
        let Some(url) = prepared.url.clone() else {
            error!(refcode, method = %prepared.method, "request has no URL");
            return Err(HttpError::new(HttpErrorKind::MissingUrl)
                .with_refcode(refcode)
                .with_clarification("The request has no destination address.")
                .with_details(format!("{} request was built without a URL", prepared.method))
                .into());
        };

        let request = self.stamp(prepared, url, refcode);
        let log = request.log_options().unwrap_or(self.config.log_options);

        if log.request_summary {
            info!(refcode, "sending {}", request.summary());
        }
        // Bodies were asked for explicitly, so they log at the same level
        // as the summaries.
        if log.request_body && !request.payload().is_empty() {
            info!(
                refcode,
                id = request.id(),
                body = %String::from_utf8_lossy(request.payload().data()),
                "request body"
            );
        }

        let exchange = match self.transport.dispatch(&request) {
            Ok(exchange) => exchange,
            Err(err) => {
                error!(refcode, id = request.id(), error = %err, "transport failure");
                return Err(HttpError::new(HttpErrorKind::Transport)
                    .with_refcode(refcode)
                    .with_clarification("The server could not be reached.")
                    .with_details(format!(
                        "{} {} failed: {err}",
                        request.method(),
                        request.url()
                    ))
                    .with_recovery("Check the network connection and try again.")
                    .with_cause(err)
                    .with_request(request)
                    .into());
            }
        };

        let (response, not_http) = match exchange {
            Exchange::Http(raw) => (
                ClientResponse::new(&request, Some(raw.status), raw.headers, raw.body),
                None,
            ),
            Exchange::Other { description, body } => (
                ClientResponse::new(&request, None, Vec::new(), body),
                Some(description),
            ),
        };

        if log.response_summary {
            info!(refcode, "received {}", response.summary());
        }
        // Failures other than a plain 404 always get their body logged.
        let forced = !response.is_success() && response.status() != Some(StatusCode::NotFound);
        if !response.data().is_empty() {
            if forced {
                warn!(refcode, id = response.request_id(), body = %response.text(), "response body");
            } else if log.response_body {
                info!(refcode, id = response.request_id(), body = %response.text(), "response body");
            }
        }

        if let Some(description) = not_http {
            let details = format!(
                "{} {} produced a non-HTTP response: {description}",
                request.method(),
                request.url()
            );
            return Err(rejected(HttpErrorKind::NotHttpResponse, request, response, details));
        }

        let Some(status) = response.status() else {
            let code = response.raw_status().unwrap_or_default();
            let details = format!(
                "{} {} returned unrecognized status {code}{}",
                request.method(),
                request.url(),
                excerpt(&response)
            );
            return Err(rejected(
                HttpErrorKind::UnrecognizedStatus(code),
                request,
                response,
                details,
            ));
        };

        if !status.is_success() {
            let details = format!(
                "{} {} returned {status}{}",
                request.method(),
                request.url(),
                excerpt(&response)
            );
            return Err(rejected(
                HttpErrorKind::Unsuccessful(status),
                request,
                response,
                details,
            ));
        }

        Ok(response)
    }

    /// Merge client headers (without overriding the request's own) and stamp
    /// the request with an id and timeout.
    fn stamp(&self, prepared: PreparedRequest, url: RequestUrl, refcode: &str) -> ClientRequest {
        let PreparedRequest {
            method,
            mut headers,
            payload,
            timeout,
            log_options,
            ..
        } = prepared;

        {
            let client_headers = self.lock_headers();
            for (name, value) in client_headers.iter() {
                if !has_header(&headers, name) {
                    headers.push((name.clone(), value.clone()));
                }
            }
        }
        if let Some(content_type) = payload.content_type() {
            if !has_header(&headers, "content-type") {
                headers.push(("content-type".to_string(), content_type.to_string()));
            }
        }

        ClientRequest::new(
            self.ids.next_id(),
            refcode,
            method,
            url,
            headers,
            timeout.unwrap_or_else(|| self.config.timeout()),
            payload,
            log_options,
        )
    }

    // -----------------------------------------------------------------------
    // Coding
    // -----------------------------------------------------------------------

    /// Serialize `body` with the client's coder.
    pub fn encode<B: Serialize + ?Sized>(
        &self,
        body: &B,
        refcode: &str,
    ) -> Result<Payload, MirageError> {
        Payload::json(&self.coder, body).map_err(|err| {
            error!(refcode, error = %err, "request body could not be encoded");
            err.with_refcode(refcode).into()
        })
    }

    pub fn decode<T: DeserializeOwned>(&self, response: &ClientResponse) -> Result<T, MirageError> {
        self.coder.decode(response.data()).map_err(|err| {
            error!(
                refcode = response.refcode(),
                id = response.request_id(),
                error = %err,
                "response body could not be decoded"
            );
            err.with_refcode(response.refcode()).into()
        })
    }

    // -----------------------------------------------------------------------
    // Verbs
    // -----------------------------------------------------------------------

    pub fn get(&self, url: &RequestUrl, refcode: &str) -> Result<ClientResponse, MirageError> {
        self.request(PreparedRequest::new(HttpMethod::Get, url.clone()), refcode)
    }

    pub fn get_data(&self, url: &RequestUrl, refcode: &str) -> Result<Vec<u8>, MirageError> {
        self.get(url, refcode).map(ClientResponse::into_data)
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &RequestUrl, refcode: &str) -> Result<T, MirageError> {
        let prepared = PreparedRequest::new(HttpMethod::Get, url.clone()).accepting_json();
        let response = self.request(prepared, refcode)?;
        self.decode(&response)
    }

    pub fn post(
        &self,
        url: &RequestUrl,
        payload: Payload,
        refcode: &str,
    ) -> Result<ClientResponse, MirageError> {
        self.send_payload(HttpMethod::Post, url, payload, refcode)
    }

    pub fn post_json<B, T>(&self, url: &RequestUrl, body: &B, refcode: &str) -> Result<T, MirageError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Post, url, body, refcode)
    }

    pub fn post_multipart(
        &self,
        url: &RequestUrl,
        form: &MultipartForm,
        refcode: &str,
    ) -> Result<ClientResponse, MirageError> {
        self.post(url, Payload::multipart(form), refcode)
    }

    pub fn post_form(
        &self,
        url: &RequestUrl,
        form: &UrlEncodedForm,
        refcode: &str,
    ) -> Result<ClientResponse, MirageError> {
        self.post(url, Payload::form(form), refcode)
    }

    pub fn put(
        &self,
        url: &RequestUrl,
        payload: Payload,
        refcode: &str,
    ) -> Result<ClientResponse, MirageError> {
        self.send_payload(HttpMethod::Put, url, payload, refcode)
    }

    pub fn put_json<B, T>(&self, url: &RequestUrl, body: &B, refcode: &str) -> Result<T, MirageError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Put, url, body, refcode)
    }

    pub fn delete(&self, url: &RequestUrl, refcode: &str) -> Result<ClientResponse, MirageError> {
        self.request(PreparedRequest::new(HttpMethod::Delete, url.clone()), refcode)
    }

    pub fn delete_json<T: DeserializeOwned>(
        &self,
        url: &RequestUrl,
        refcode: &str,
    ) -> Result<T, MirageError> {
        let prepared = PreparedRequest::new(HttpMethod::Delete, url.clone()).accepting_json();
        let response = self.request(prepared, refcode)?;
        self.decode(&response)
    }

    fn send_payload(
        &self,
        method: HttpMethod,
        url: &RequestUrl,
        payload: Payload,
        refcode: &str,
    ) -> Result<ClientResponse, MirageError> {
        self.request(
            PreparedRequest::new(method, url.clone()).with_payload(payload),
            refcode,
        )
    }

    fn send_json<B, T>(
        &self,
        method: HttpMethod,
        url: &RequestUrl,
        body: &B,
        refcode: &str,
    ) -> Result<T, MirageError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.encode(body, refcode)?;
        let prepared = PreparedRequest::new(method, url.clone())
            .with_payload(payload)
            .accepting_json();
        let response = self.request(prepared, refcode)?;
        self.decode(&response)
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

fn excerpt(response: &ClientResponse) -> String {
    if response.data().is_empty() {
        return String::new();
    }
    let text = response.text();
    let cut: String = text.chars().take(DETAIL_EXCERPT).collect();
    format!(": {cut}")
}

fn clarification(kind: HttpErrorKind) -> String {
    match kind {
        HttpErrorKind::Unsuccessful(status) if status.is_client_error() => {
            format!("The server rejected the request ({status}).")
        }
        HttpErrorKind::Unsuccessful(status) if status.is_server_error() => {
            format!("The server failed to handle the request ({status}).")
        }
        HttpErrorKind::Unsuccessful(status) => {
            format!("The server did not complete the request ({status}).")
        }
        HttpErrorKind::UnrecognizedStatus(code) => {
            format!("The server answered with an unexpected status ({code}).")
        }
        _ => "The server sent a response that could not be understood.".to_string(),
    }
}

fn rejected(
    kind: HttpErrorKind,
    request: ClientRequest,
    response: ClientResponse,
    details: String,
) -> MirageError {
    error!(
        refcode = request.refcode(),
        id = request.id(),
        %kind,
        "{}",
        request.summary()
    );

    let mut err = HttpError::new(kind)
        .with_refcode(request.refcode())
        .with_clarification(clarification(kind))
        .with_details(details);
    if let Some(code) = response.raw_status() {
        err = err.with_user_info("status", code);
    }
    match kind {
        HttpErrorKind::Unsuccessful(StatusCode::Unauthorized) => {
            err = err.with_recovery("Sign in again, then retry.");
        }
        HttpErrorKind::Unsuccessful(status) if status.is_server_error() => {
            err = err.with_recovery("Try again later.");
        }
        _ => {}
    }
    err.with_request(request).with_response(response).into()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::error::Error as _;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::{JsonProcess, MirageError};
    use crate::http::LogOptions;
    use crate::transport::{RawResponse, TransportError};

    #[derive(Debug, Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<Exchange, TransportError>>>,
        seen: Mutex<Vec<ClientRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Exchange, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<ClientRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for Scripted {
        fn dispatch(&self, request: &ClientRequest) -> Result<Exchange, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("no scripted reply".to_string())))
        }
    }

    fn reply(status: u16, body: &str) -> Result<Exchange, TransportError> {
        Ok(Exchange::Http(RawResponse {
            status,
            headers: vec![("Content-Type".to_string(), b"text/plain".to_vec())],
            body: body.as_bytes().to_vec(),
        }))
    }

    fn client(transport: Arc<Scripted>) -> HttpClient {
        let config = ClientConfig::default().with_log_options(LogOptions::NONE);
        HttpClient::with_transport(config, transport)
    }

    fn url() -> RequestUrl {
        RequestUrl::parse("https://api.example.com/v1/items").unwrap()
    }

    fn http_error(err: MirageError) -> HttpError {
        match err {
            MirageError::Http(err) => err,
            other => panic!("expected HttpError, got {other:?}"),
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
    }

    #[test]
    fn success_returns_body_unmodified() {
        let transport = Scripted::new(vec![reply(200, "\u{0}raw bytes\u{7f}")]);
        let data = client(transport).get_data(&url(), "R-1").unwrap();
        assert_eq!(data, b"\x00raw bytes\x7f".to_vec());
    }

    #[test]
    fn empty_success_body_is_allowed() {
        let transport = Scripted::new(vec![reply(204, "")]);
        let response = client(transport).delete(&url(), "R-1").unwrap();
        assert_eq!(response.status(), Some(StatusCode::NoContent));
        assert!(response.data().is_empty());
    }

    #[test]
    fn known_failure_status_carries_status_and_body() {
        for (code, status) in [(404, StatusCode::NotFound), (500, StatusCode::InternalServerError)] {
            let transport = Scripted::new(vec![reply(code, "nope")]);
            let err = http_error(client(transport).get(&url(), "R-404").unwrap_err());
            assert_eq!(err.kind(), HttpErrorKind::Unsuccessful(status));
            assert_eq!(err.status(), Some(status));
            assert_eq!(err.data(), Some(&b"nope"[..]));
            assert_eq!(err.refcode(), Some("R-404"));
            assert!(err.details().unwrap().ends_with(": nope"));
            assert_eq!(err.context().user_info["status"], code);
            assert!(err.request().is_some());
            assert!(err.time_range().is_some());
        }
    }

    #[test]
    fn unrecognized_status_is_fatal() {
        let transport = Scripted::new(vec![reply(599, "odd")]);
        let err = http_error(client(transport).get(&url(), "R-599").unwrap_err());
        assert_eq!(err.kind(), HttpErrorKind::UnrecognizedStatus(599));
        assert_eq!(err.status(), None);
        assert_eq!(err.raw_status(), Some(599));
    }

    #[test]
    fn non_http_exchange_is_fatal() {
        let transport = Scripted::new(vec![Ok(Exchange::Other {
            description: "ftp reply".to_string(),
            body: b"220 ready".to_vec(),
        })]);
        let err = http_error(client(transport).get(&url(), "R-X").unwrap_err());
        assert_eq!(err.kind(), HttpErrorKind::NotHttpResponse);
        assert_eq!(err.data(), Some(&b"220 ready"[..]));
        assert!(err.details().unwrap().contains("ftp reply"));
    }

    #[test]
    fn transport_failure_wraps_cause() {
        let transport = Scripted::new(vec![Err(TransportError::Other("dns lookup failed".to_string()))]);
        let err = http_error(client(transport).get(&url(), "R-T").unwrap_err());
        assert_eq!(err.kind(), HttpErrorKind::Transport);
        assert_eq!(err.source().unwrap().to_string(), "dns lookup failed");
        assert_eq!(err.context().underlying.len(), 1);
        assert!(err.response().is_none());
        assert_eq!(err.request().unwrap().refcode(), "R-T");
    }

    #[test]
    fn missing_url_never_dispatches() {
        let transport = Scripted::new(vec![reply(200, "")]);
        let client = client(Arc::clone(&transport));
        let err = http_error(
            client
                .request(PreparedRequest::new(HttpMethod::Get, None), "R-U")
                .unwrap_err(),
        );
        assert_eq!(err.kind(), HttpErrorKind::MissingUrl);
        assert_eq!(err.refcode(), Some("R-U"));
        assert!(transport.seen().is_empty());
    }

    #[test]
    fn request_headers_win_over_client_headers() {
        let transport = Scripted::new(vec![reply(200, "")]);
        let client = client(Arc::clone(&transport));
        client.set_header("X-Tenant", "default");
        client.set_header("X-Trace", "on");

        let prepared = PreparedRequest::new(HttpMethod::Post, url())
            .with_header("x-tenant", "override")
            .with_payload(Payload::text("hello"))
            .with_timeout(Duration::from_secs(3));
        client.request(prepared, "R-H").unwrap();

        let sent = &transport.seen()[0];
        assert_eq!(sent.header("X-Tenant"), Some("override"));
        assert_eq!(sent.header("x-trace"), Some("on"));
        assert_eq!(sent.header("content-type"), Some("text/plain; charset=utf-8"));
        assert!(sent.header("user-agent").unwrap().starts_with("mirage-core/"));
        assert_eq!(sent.timeout(), Duration::from_secs(3));
        assert_eq!(sent.refcode(), "R-H");
    }

    #[test]
    fn authorization_is_set_and_cleared() {
        let transport = Scripted::new(vec![reply(200, ""), reply(200, "")]);
        let client = client(Arc::clone(&transport));

        client.set_authorization(Some(&OAuthToken::new("tok-1")));
        assert_eq!(client.header("Authorization").as_deref(), Some("Bearer tok-1"));
        client.get(&url(), "R-A").unwrap();

        client.set_authorization(None);
        assert_eq!(client.header("authorization"), None);
        client.get(&url(), "R-B").unwrap();

        let seen = transport.seen();
        assert_eq!(seen[0].header("authorization"), Some("Bearer tok-1"));
        assert_eq!(seen[1].header("authorization"), None);
    }

    #[test]
    fn ids_increase_per_request_and_wrap() {
        let transport = Scripted::new((0..4).map(|_| reply(200, "")).collect());
        let client = client(Arc::clone(&transport))
            .with_request_ids(RequestIdCounter::starting_at(u64::MAX - 2));
        for _ in 0..4 {
            client.get(&url(), "R-I").unwrap();
        }
        let ids: Vec<u64> = transport.seen().iter().map(ClientRequest::id).collect();
        assert_eq!(ids, vec![u64::MAX - 2, u64::MAX - 1, 0, 1]);
    }

    #[test]
    fn json_verbs_encode_and_decode() {
        let transport = Scripted::new(vec![reply(201, r#"{"name":"saved","count":2}"#)]);
        let client = client(Arc::clone(&transport));
        let item = Item {
            name: "new".to_string(),
            count: 1,
        };
        let saved: Item = client.post_json(&url(), &item, "R-J").unwrap();
        assert_eq!(
            saved,
            Item {
                name: "saved".to_string(),
                count: 2
            }
        );

        let sent = &transport.seen()[0];
        assert_eq!(sent.method(), HttpMethod::Post);
        assert_eq!(sent.header("accept"), Some("application/json"));
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.payload().data(), br#"{"count":1,"name":"new"}"#);
        assert!(sent.payload().type_name().unwrap().ends_with("Item"));
    }

    #[test]
    fn decode_failure_is_json_error_with_refcode() {
        let transport = Scripted::new(vec![reply(200, "{broken")]);
        let err = client(transport)
            .get_json::<Item>(&url(), "R-D")
            .unwrap_err();
        let json = err.as_json().expect("json error");
        assert_eq!(json.process(), JsonProcess::Decode);
        assert_eq!(json.json_text(), Some("{broken"));
        assert_eq!(err.refcode(), Some("R-D"));
    }

    #[test]
    fn multipart_and_form_payloads_declare_content_type() {
        let transport = Scripted::new(vec![reply(200, ""), reply(200, "")]);
        let client = client(Arc::clone(&transport));
        let form = MultipartForm::with_boundary("BOUND").field("a", "1");
        client.post_multipart(&url(), &form, "R-M").unwrap();
        client
            .post_form(&url(), &UrlEncodedForm::new().set("q", "x y"), "R-F")
            .unwrap();

        let seen = transport.seen();
        assert_eq!(
            seen[0].header("content-type"),
            Some("multipart/form-data; boundary=BOUND")
        );
        assert_eq!(
            seen[1].header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(seen[1].payload().data(), b"q=x+y");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged_at_info(run: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, run);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn verbose_bodies_are_visible_at_info() {
        let transport = Scripted::new(vec![reply(200, "pong-body")]);
        let client = client(transport);
        let out = logged_at_info(|| {
            let prepared = PreparedRequest::new(HttpMethod::Post, url())
                .with_payload(Payload::text("ping-body"))
                .with_log_options(LogOptions::VERBOSE);
            client.request(prepared, "R-V").unwrap();
        });
        assert!(out.contains("request body"), "{out}");
        assert!(out.contains("ping-body"), "{out}");
        assert!(out.contains("response body"), "{out}");
        assert!(out.contains("pong-body"), "{out}");
    }

    #[test]
    fn summary_logging_leaves_bodies_out() {
        let transport = Scripted::new(vec![reply(200, "pong-body")]);
        let client = client(transport);
        let out = logged_at_info(|| {
            let prepared = PreparedRequest::new(HttpMethod::Post, url())
                .with_payload(Payload::text("ping-body"))
                .with_log_options(LogOptions::SUMMARY);
            client.request(prepared, "R-S").unwrap();
        });
        assert!(out.contains("sending #"), "{out}");
        assert!(!out.contains("ping-body"), "{out}");
        assert!(!out.contains("pong-body"), "{out}");
    }

    #[test]
    fn headers_are_safe_to_mutate_across_threads() {
        let client = Arc::new(client(Scripted::new(Vec::new())));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let client = Arc::clone(&client);
                std::thread::spawn(move || client.set_header(&format!("x-worker-{i}"), i.to_string()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let headers = client.headers();
        assert_eq!(headers.len(), 9);
        assert_eq!(headers["x-worker-3"], "3");
    }
}
