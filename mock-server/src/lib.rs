//! Fixture HTTP server for exercising the client over real sockets.
//!
//! Routes:
//! - `ANY /echo`: reflects method, path, query, headers and body as JSON.
//! - `GET /status/{code}`: answers with exactly that status.
//! - `GET /secure`: 200 only with `Authorization: Bearer fixture-token`.
//! - `GET /slow/{millis}`: sleeps before answering.
//! - `GET /malformed`: 200 with a truncated JSON body.
//! - `GET /bytes/{count}`: 200 with `count` bytes of `x`.
//! - `/notes`, `/notes/{id}`, `POST /notes/form`: in-memory note store.

use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const FIXTURE_TOKEN: &str = "fixture-token";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Form variant of `NewNote`; `tags` is comma-separated.
#[derive(Deserialize)]
pub struct NoteForm {
    pub title: String,
    pub tags: Option<String>,
}

#[derive(Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// What `/echo` saw.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Note>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", get(status))
        .route("/secure", get(secure))
        .route("/slow/{millis}", get(slow))
        .route("/malformed", get(malformed))
        .route("/bytes/{count}", get(bytes))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/form", post(create_note_from_form))
        .route(
            "/notes/{id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Serve on a random local port from a background thread.
pub fn spawn() -> std::io::Result<SocketAddr> {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = std_listener.local_addr()?;
    std_listener.set_nonblocking(true)?;

    std::thread::spawn(move || -> std::io::Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(async {
            let listener = TcpListener::from_std(std_listener)?;
            run(listener).await
        })
    });

    Ok(addr)
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    debug!(%method, %uri, bytes = body.len(), "echo");
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid status code").into_response(),
    }
}

async fn secure(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {FIXTURE_TOKEN}");
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if presented == Some(expected.as_str()) {
        Json(serde_json::json!({ "user": "fixture" })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "missing or invalid bearer token" })),
        )
            .into_response()
    }
}

async fn slow(Path(millis): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    "done"
}

async fn malformed() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], r#"{"title": "#)
}

async fn bytes(Path(count): Path<usize>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![b'x'; count],
    )
}

async fn list_notes(State(db): State<Db>) -> Json<Vec<Note>> {
    let notes = db.read().await;
    let mut notes: Vec<Note> = notes.values().cloned().collect();
    notes.sort_by(|a, b| a.title.cmp(&b.title));
    Json(notes)
}

async fn create_note(State(db): State<Db>, Json(input): Json<NewNote>) -> (StatusCode, Json<Note>) {
    let note = insert(&db, input.title, input.tags).await;
    (StatusCode::CREATED, Json(note))
}

async fn create_note_from_form(
    State(db): State<Db>,
    Form(input): Form<NoteForm>,
) -> (StatusCode, Json<Note>) {
    let tags = input
        .tags
        .map(|tags| {
            tags.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let note = insert(&db, input.title, tags).await;
    (StatusCode::CREATED, Json(note))
}

async fn insert(db: &Db, title: String, tags: Vec<String>) -> Note {
    let note = Note {
        id: Uuid::new_v4(),
        title,
        tags,
    };
    db.write().await.insert(note.id, note.clone());
    note
}

async fn get_note(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Note>, StatusCode> {
    let notes = db.read().await;
    notes.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_note(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<NotePatch>,
) -> Result<Json<Note>, StatusCode> {
    let mut notes = db.write().await;
    let note = notes.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(title) = input.title {
        note.title = title;
    }
    if let Some(tags) = input.tags {
        note.tags = tags;
    }
    Ok(Json(note.clone()))
}

async fn delete_note(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<StatusCode, StatusCode> {
    let mut notes = db.write().await;
    notes
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}
