//! End-to-end tests against the live fixture server.
//!
//! # Design
//! Each test starts the fixture server on a random port and drives
//! `HttpClient` over real HTTP through the default ureq transport, so URL
//! assembly, payload encoding, header merging, status gating and JSON
//! decoding are all checked against an actual peer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mirage_core::{
    ClientConfig, HttpClient, HttpErrorKind, HttpMethod, JsonFailure, JsonProcess, LogOptions,
    MirageError, MultipartForm, OAuthToken, PreparedRequest, RequestUrl, StatusCode, UrlBuilder,
    UrlEncodedForm,
};
use mock_server::{Echo, Note, FIXTURE_TOKEN};
use pretty_assertions::assert_eq;
use serde_json::json;

fn start() -> (HttpClient, UrlBuilder) {
    let addr = mock_server::spawn().unwrap();
    let client = HttpClient::new(ClientConfig::default().with_timeout(Duration::from_secs(5)));
    let base = UrlBuilder::parse(&format!("http://{addr}")).unwrap();
    (client, base)
}

fn url(base: &UrlBuilder, path: &str) -> RequestUrl {
    base.clone().appending_path(Some(path)).build().unwrap()
}

fn http_kind(err: &MirageError) -> HttpErrorKind {
    err.as_http().expect("expected an HTTP error").kind()
}

#[test]
fn note_lifecycle() {
    let (client, base) = start();
    let notes = url(&base, "notes");

    // Step 1: empty store.
    let listed: Vec<Note> = client.get_json(&notes, "LIST-1").unwrap();
    assert!(listed.is_empty(), "expected empty list");

    // Step 2: create from JSON.
    let created: Note = client
        .post_json(&notes, &json!({ "title": "Groceries", "tags": ["home"] }), "CREATE-1")
        .unwrap();
    assert_eq!(created.title, "Groceries");
    assert_eq!(created.tags, vec!["home".to_string()]);

    // Step 3: create from a url-encoded form.
    let form = UrlEncodedForm::new()
        .set("title", "Call Bob")
        .set("tags", "work, phone");
    let response = client
        .post_form(&url(&base, "notes/form"), &form, "CREATE-2")
        .unwrap();
    assert_eq!(response.status(), Some(StatusCode::Created));
    let from_form: Note = client.decode(&response).unwrap();
    assert_eq!(from_form.tags, vec!["work".to_string(), "phone".to_string()]);

    // Step 4: list sorted by title.
    let listed: Vec<Note> = client.get_json(&notes, "LIST-2").unwrap();
    let titles: Vec<&str> = listed.iter().map(|note| note.title.as_str()).collect();
    assert_eq!(titles, vec!["Call Bob", "Groceries"]);

    // Step 5: update.
    let one = url(&base, &format!("notes/{}", created.id));
    let updated: Note = client
        .put_json(&one, &json!({ "title": "Groceries (done)" }), "UPDATE-1")
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.title, "Groceries (done)");
    assert_eq!(updated.tags, vec!["home".to_string()]);

    // Step 6: delete, then the note is gone.
    let response = client.delete(&one, "DELETE-1").unwrap();
    assert_eq!(response.status(), Some(StatusCode::NoContent));
    assert!(response.data().is_empty());

    let err = client.get_json::<Note>(&one, "GET-GONE").unwrap_err();
    assert_eq!(http_kind(&err), HttpErrorKind::Unsuccessful(StatusCode::NotFound));
    assert_eq!(err.refcode(), Some("GET-GONE"));
}

#[test]
fn unsuccessful_status_carries_response() {
    let (client, base) = start();
    let err = client
        .get(&url(&base, "status/500"), "STATUS-500")
        .unwrap_err();

    let http = err.as_http().unwrap();
    assert_eq!(http.kind(), HttpErrorKind::Unsuccessful(StatusCode::InternalServerError));
    assert_eq!(http.status(), Some(StatusCode::InternalServerError));
    assert_eq!(http.raw_status(), Some(500));
    assert_eq!(http.data(), Some(&b"status 500"[..]));
    assert!(http.request().is_some());
    assert!(http.time_range().is_some());
    assert_eq!(err.refcode(), Some("STATUS-500"));
    assert!(err.details().unwrap().contains("status 500"));
    assert!(err.recovery().is_some());
    assert_eq!(err.user_info()["status"], json!(500));
}

#[test]
fn unrecognized_status_is_distinct() {
    let (client, base) = start();
    let err = client.get(&url(&base, "status/599"), "STATUS-599").unwrap_err();

    assert_eq!(http_kind(&err), HttpErrorKind::UnrecognizedStatus(599));
    let http = err.as_http().unwrap();
    assert_eq!(http.status(), None);
    assert_eq!(http.raw_status(), Some(599));
}

#[test]
fn bearer_token_unlocks_secure_route() {
    let (client, base) = start();
    let secure = url(&base, "secure");

    let err = client.get(&secure, "AUTH-1").unwrap_err();
    assert_eq!(http_kind(&err), HttpErrorKind::Unsuccessful(StatusCode::Unauthorized));

    client.set_authorization(Some(&OAuthToken::new(FIXTURE_TOKEN)));
    let body: serde_json::Value = client.get_json(&secure, "AUTH-2").unwrap();
    assert_eq!(body["user"], "fixture");

    client.set_authorization(None);
    assert!(client.get(&secure, "AUTH-3").is_err());
}

#[test]
fn echo_sees_merged_headers_and_query() {
    let (client, base) = start();
    client.set_header("X-Client", "mirage");
    client.set_header("X-Shared", "from-client");

    let target = base
        .clone()
        .appending_path(Some("/echo/"))
        .adding_query_item("page", Some(2))
        .adding_query_item("q", Some("a b&c"))
        .adding_query_item::<bool>("skipped", None)
        .adding_query_flag("verbose")
        .build()
        .unwrap();
    let prepared = PreparedRequest::new(HttpMethod::Get, target)
        .with_header("x-shared", "from-request")
        .accepting_json();
    let response = client.request(prepared, "ECHO-1").unwrap();
    let echo: Echo = client.decode(&response).unwrap();

    assert_eq!(echo.method, "GET");
    assert_eq!(echo.path, "/echo");
    assert_eq!(echo.query.as_deref(), Some("page=2&q=a+b%26c&verbose"));
    assert_eq!(echo.headers["x-client"], "mirage");
    assert_eq!(echo.headers["x-shared"], "from-request");
    assert_eq!(echo.headers["accept"], "application/json");
    assert!(echo.headers["user-agent"].starts_with("mirage-core/"));
}

#[test]
fn multipart_body_reaches_server() {
    let (client, base) = start();
    let form = MultipartForm::with_boundary("fixture-boundary")
        .field("title", "Report")
        .json("meta", client.coder(), &json!({ "b": 1, "a": 2 }))
        .unwrap()
        .file("upload", "notes.txt", Some("text/plain"), b"hello".to_vec());

    let response = client
        .post_multipart(&url(&base, "echo"), &form, "MULTI-1")
        .unwrap();
    let echo: Echo = client.decode(&response).unwrap();

    assert_eq!(echo.method, "POST");
    assert_eq!(
        echo.headers["content-type"],
        "multipart/form-data; boundary=fixture-boundary"
    );
    assert_eq!(echo.body.as_bytes(), form.encode().as_slice());
    assert!(echo.body.contains(r#"{"a":2,"b":1}"#));
    assert!(echo.body.ends_with("--fixture-boundary--\r\n"));
}

#[test]
fn large_body_is_returned_whole() {
    let (client, base) = start();
    let size = 11 * 1024 * 1024;
    let data = client
        .get_data(&url(&base, &format!("bytes/{size}")), "BIG-1")
        .unwrap();
    assert_eq!(data.len(), size);
    assert!(data.iter().all(|&b| b == b'x'));
}

#[test]
fn malformed_body_is_a_json_error() {
    let (client, base) = start();
    let err = client
        .get_json::<Note>(&url(&base, "malformed"), "MALFORMED-1")
        .unwrap_err();

    let json = err.as_json().expect("expected a JSON error");
    assert_eq!(json.process(), JsonProcess::Decode);
    assert_eq!(json.failure(), &JsonFailure::CorruptedData);
    assert_eq!(json.json_text(), Some(r#"{"title": "#));
    assert_eq!(err.refcode(), Some("MALFORMED-1"));
}

#[test]
fn slow_response_times_out_as_transport_error() {
    let (client, base) = start();
    let prepared = PreparedRequest::new(HttpMethod::Get, url(&base, "slow/2000"))
        .with_timeout(Duration::from_millis(200))
        .with_log_options(LogOptions::VERBOSE);

    let err = client.request(prepared, "SLOW-1").unwrap_err();
    assert_eq!(http_kind(&err), HttpErrorKind::Transport);
    assert_eq!(err.underlying().len(), 1);
    assert!(err.as_http().unwrap().response().is_none());
}

#[test]
fn sub_second_client_timeout_still_serves_fast_routes() {
    let addr = mock_server::spawn().unwrap();
    let config = ClientConfig::default().with_timeout(Duration::from_millis(900));
    let client = HttpClient::new(config);
    let base = UrlBuilder::parse(&format!("http://{addr}")).unwrap();

    let echo: Echo = client.get_json(&url(&base, "echo"), "FAST-1").unwrap();
    assert_eq!(echo.path, "/echo");

    let err = client.get(&url(&base, "slow/2000"), "FAST-2").unwrap_err();
    assert_eq!(http_kind(&err), HttpErrorKind::Transport);
}

#[test]
fn unreachable_host_is_a_transport_error() {
    // Bind then drop to get a port nobody is listening on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = HttpClient::new(ClientConfig::default());
    let target = UrlBuilder::new()
        .setting_scheme(Some("http"))
        .setting_host(Some("127.0.0.1"))
        .setting_port(Some(port))
        .build()
        .unwrap();

    let err = client.get(&target, "DOWN-1").unwrap_err();
    assert_eq!(http_kind(&err), HttpErrorKind::Transport);
    assert_eq!(err.clarification(), Some("The server could not be reached."));
}

#[test]
fn concurrent_requests_get_distinct_ids() {
    let (client, base) = start();
    let client = Arc::new(client);
    let echo = url(&base, "echo");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            let echo = echo.clone();
            std::thread::spawn(move || {
                client
                    .get(&echo, &format!("THREAD-{i}"))
                    .unwrap()
                    .request_id()
            })
        })
        .collect();

    let ids: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 8);
}
