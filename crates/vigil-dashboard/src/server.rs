//! [`DashboardServer`] – HTTP + WebSocket server for the monitoring dashboard.
//!
//! Listens on `0.0.0.0:3000` (configurable via [`DashboardServer::with_port`]).
//!
//! | Request | Response |
//! |---|---|
//! | `GET /` | embedded dashboard page |
//! | `GET /captions.json` | caption records |
//! | `GET /behavior_analysis.json` | behaviour-analysis records |
//! | `GET /data.json` | knowledge base |
//! | `GET /patient_info.json` | patient profile, `404` if none saved yet |
//! | `POST /save-patient-info` | validate and persist a patient profile |
//! | WebSocket upgrade on any path | stream of [`ObservationEvent`]s |
//!
//! The profile endpoint has no authentication; bind to a trusted interface.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use vigil_memory::profile::{load_profile, save_profile};
use vigil_memory::{
    JsonFileKnowledgeStore, JsonFileRecordStore, KnowledgeStore, RecordStore, SqliteStore,
};
use vigil_types::{ANALYSIS_STORE, CAPTION_STORE, ObservationEvent, PatientProfile};

/// Default TCP port for the dashboard.
pub const DEFAULT_PORT: u16 = 3000;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("bind error on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

// ---------------------------------------------------------------------------
// Read access to the stores
// ---------------------------------------------------------------------------

/// Read-only view over whichever backend the pipeline writes to.
pub enum StoreView {
    Json {
        records: JsonFileRecordStore,
        knowledge: JsonFileKnowledgeStore,
    },
    Sqlite(Mutex<SqliteStore>),
}

impl StoreView {
    /// View over the JSON files in `dir`.
    pub fn json_dir(dir: impl AsRef<Path>) -> Self {
        StoreView::Json {
            records: JsonFileRecordStore::new(dir.as_ref()),
            knowledge: JsonFileKnowledgeStore::in_dir(dir),
        }
    }

    pub fn sqlite(store: SqliteStore) -> Self {
        StoreView::Sqlite(Mutex::new(store))
    }

    fn records(&self, store: &str) -> Vec<Value> {
        match self {
            StoreView::Json { records, .. } => records.records(store),
            StoreView::Sqlite(db) => db.lock().unwrap_or_else(|e| e.into_inner()).records(store),
        }
    }

    fn knowledge(&self) -> Value {
        match self {
            StoreView::Json { knowledge, .. } => knowledge.load().to_value(),
            StoreView::Sqlite(db) => db.lock().unwrap_or_else(|e| e.into_inner()).load().to_value(),
        }
    }
}

struct DashboardState {
    view: StoreView,
    profile_path: PathBuf,
    events: broadcast::Sender<ObservationEvent>,
}

// ---------------------------------------------------------------------------
// DashboardServer
// ---------------------------------------------------------------------------

pub struct DashboardServer {
    state: Arc<DashboardState>,
    port: u16,
}

impl DashboardServer {
    /// Create a server over `view`, editing the profile at `profile_path`
    /// and relaying `events` to WebSocket clients.
    pub fn new(
        view: StoreView,
        profile_path: impl Into<PathBuf>,
        events: broadcast::Sender<ObservationEvent>,
    ) -> Self {
        Self {
            state: Arc::new(DashboardState {
                view,
                profile_path: profile_path.into(),
                events,
            }),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve forever.
    pub async fn run(self) -> Result<(), DashboardError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| DashboardError::Bind { addr, source })?;
        info!("dashboard listening on http://localhost:{}", self.port);
        self.serve(listener).await
    }

    /// Serve connections accepted from an already-bound `listener`.
    pub async fn serve(self, listener: TcpListener) -> Result<(), DashboardError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, state).await {
                            debug!(%peer, error = %e, "dashboard client error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "dashboard accept error"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: Arc<DashboardState>,
) -> Result<(), DashboardError> {
    // `peek` leaves the request in the socket for tungstenite's handshake.
    let mut buf = [0u8; 1024];
    let n = stream.peek(&mut buf).await?;
    let preview = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = preview.lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });

    if is_ws_upgrade {
        return handle_ws(stream, peer, &state).await;
    }

    let response = match read_request(&mut stream).await {
        Ok(request) => route(&state, &request),
        Err(DashboardError::BadRequest(reason)) => {
            Response::json(400, &json!({ "error": reason }))
        }
        Err(e) => return Err(e),
    };
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    state: &DashboardState,
) -> Result<(), DashboardError> {
    // Subscribe before the handshake completes so no event published after
    // the client sees the upgrade response is missed.
    let mut events = state.events.subscribe();
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    debug!(%peer, "websocket client connected");

    loop {
        tokio::select! {
            result = events.recv() => match result {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "event serialisation failed"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(%peer, skipped = n, "websocket client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Minimal HTTP/1.1 request handling
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

struct Head {
    method: String,
    path: String,
    content_length: usize,
}

fn parse_head(head: &str) -> Result<Head, DashboardError> {
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(DashboardError::BadRequest("malformed request line".into()));
    };
    let path = target.split('?').next().unwrap_or("/").to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| DashboardError::BadRequest("invalid Content-Length".into()))
        })
        .transpose()?
        .unwrap_or(0);
    Ok(Head {
        method: method.to_ascii_uppercase(),
        path,
        content_length,
    })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_request(stream: &mut TcpStream) -> Result<Request, DashboardError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(DashboardError::BadRequest("connection closed mid-request".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(DashboardError::BadRequest("request headers too large".into()));
        }
    };

    let head = parse_head(&String::from_utf8_lossy(&buf[..header_end]))?;
    if head.content_length > MAX_BODY_BYTES {
        return Err(DashboardError::BadRequest("request body too large".into()));
    }
    let mut body = buf.split_off(header_end + 4);
    while body.len() < head.content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(DashboardError::BadRequest("connection closed mid-body".into()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(head.content_length);
    Ok(Request {
        method: head.method,
        path: head.path,
        body,
    })
}

struct Response {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: serde_json::to_vec_pretty(value).unwrap_or_default(),
        }
    }

    fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Cache-Control: no-store\r\n\
             Connection: close\r\n\
             \r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

fn route(state: &DashboardState, request: &Request) -> Response {
    // The page appends a cache-busting query to every fetch.
    let path = request.path.split('?').next().unwrap_or_default();
    match (request.method.as_str(), path) {
        ("GET", "/") | ("GET", "/index.html") => Response::html(DASHBOARD_HTML),
        ("GET", "/captions.json") => {
            Response::json(200, &Value::Array(state.view.records(CAPTION_STORE)))
        }
        ("GET", "/behavior_analysis.json") => {
            Response::json(200, &Value::Array(state.view.records(ANALYSIS_STORE)))
        }
        ("GET", "/data.json") => Response::json(200, &state.view.knowledge()),
        ("GET", "/patient_info.json") => patient_info(&state.profile_path),
        ("POST", "/save-patient-info") => save_patient_info(&state.profile_path, &request.body),
        (_, "/save-patient-info") => {
            Response::json(405, &json!({ "error": "Use POST to save patient information" }))
        }
        _ => Response::json(404, &json!({ "error": "Not found" })),
    }
}

fn patient_info(path: &Path) -> Response {
    match load_profile(path) {
        Ok(Some(profile)) => match serde_json::to_value(profile) {
            Ok(value) => Response::json(200, &value),
            Err(_) => Response::json(500, &json!({ "error": "Invalid JSON data" })),
        },
        Ok(None) => Response::json(404, &json!({ "error": "Patient information not found" })),
        Err(e) => {
            warn!(error = %e, "patient profile unreadable");
            Response::json(500, &json!({ "error": "Invalid JSON data" }))
        }
    }
}

fn save_patient_info(path: &Path, body: &[u8]) -> Response {
    let invalid = || Response::json(400, &json!({ "error": "Invalid patient information format" }));

    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return invalid();
    };
    let sections_present = ["personal", "medical", "monitoring"]
        .iter()
        .all(|section| value.get(section).is_some_and(Value::is_object));
    if !sections_present {
        return invalid();
    }
    let Ok(profile) = serde_json::from_value::<PatientProfile>(value) else {
        return invalid();
    };
    if let Err(e) = profile.validate() {
        return Response::json(400, &json!({ "error": e.to_string() }));
    }

    match save_profile(path, &profile) {
        Ok(()) => {
            info!("patient profile updated from dashboard");
            Response::json(
                200,
                &json!({ "success": true, "message": "Patient information saved successfully" }),
            )
        }
        Err(e) => Response::json(
            500,
            &json!({ "error": format!("Failed to save patient information: {e}") }),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
