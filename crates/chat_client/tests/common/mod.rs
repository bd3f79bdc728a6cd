//! In-process backend for integration tests: an axum router serving the REST
//! routes and the socket endpoint on the same port.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub const TOKEN: &str = "tok-1";

pub const FRIENDS_BODY: &str = r#"{"friends":[{"username":"amy","status":"online"},{"username":"bob","status":"offline"}],"pending_incoming":["zed"],"pending_outgoing":[]}"#;

pub const CHATS_BODY: &str = r#"{"chats":[{"chat_id":"c1","type":"private","participants":["me","amy"],"unread_count":0},{"chat_id":"g1","type":"group","participants":["me","amy","bob"],"admin":"me","name":"Team","unread_count":0}]}"#;

enum Outgoing {
    Text(String),
    Close,
}

struct Shared {
    logins: AtomicUsize,
    sockets: AtomicUsize,
    reject_login: AtomicBool,
    current: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    frames: mpsc::UnboundedSender<String>,
}

type AppState = Arc<Shared>;

pub struct MockBackend {
    pub url: String,
    shared: AppState,
    frames: mpsc::UnboundedReceiver<String>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            logins: AtomicUsize::new(0),
            sockets: AtomicUsize::new(0),
            reject_login: AtomicBool::new(false),
            current: Mutex::new(None),
            frames: frames_tx,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = router(shared.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            shared,
            frames,
        }
    }

    pub fn reject_logins(&self) {
        self.shared.reject_login.store(true, Ordering::SeqCst);
    }

    pub fn logins(&self) -> usize {
        self.shared.logins.load(Ordering::SeqCst)
    }

    pub fn sockets(&self) -> usize {
        self.shared.sockets.load(Ordering::SeqCst)
    }

    /// Next text frame the client sent, in order.
    pub async fn next_frame(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.frames.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip frames until one satisfies `pred`.
    pub async fn frame_matching(
        &mut self,
        pred: impl Fn(&str) -> bool,
        timeout: Duration,
    ) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            let frame = self.next_frame(left).await?;
            if pred(&frame) {
                return Some(frame);
            }
        }
    }

    /// Send a text frame on the most recent socket.
    pub fn send(&self, text: &str) -> bool {
        match self.shared.current.lock().unwrap().as_ref() {
            Some(tx) => tx.send(Outgoing::Text(text.to_string())).is_ok(),
            None => false,
        }
    }

    /// Close the most recent socket from the server side.
    pub fn close_socket(&self) {
        if let Some(tx) = self.shared.current.lock().unwrap().take() {
            let _ = tx.send(Outgoing::Close);
        }
    }
}

/// A `http://` URL nothing listens on.
pub fn unreachable_url() -> String {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    format!("http://127.0.0.1:{port}")
}

fn router(shared: AppState) -> Router {
    let protected = Router::new()
        .route("/api/friends", get(|| async { raw_json(FRIENDS_BODY) }))
        .route("/api/friends/{action}", post(ok))
        .route("/api/chats", get(|| async { raw_json(CHATS_BODY) }))
        .route(
            "/api/chats/create",
            post(|| async { Json(json!({ "chat_id": "c9" })) }),
        )
        .route("/api/chats/delete/{chat_id}", delete(ok))
        .route("/api/chats/group/delete/{chat_id}", delete(ok))
        .route("/api/chats/group/{action}", post(ok))
        .route_layer(middleware::from_fn(require_token));

    Router::new()
        .route("/api/auth/login", post(login))
        .route(
            "/api/auth/register",
            post(|| async { (StatusCode::CONFLICT, Json(json!({}))) }),
        )
        .route("/socket.io/", get(socket_upgrade))
        .merge(protected)
        .fallback(|| async { (StatusCode::NOT_FOUND, Json(json!({}))) })
        .with_state(shared)
}

fn raw_json(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn ok() -> Json<Value> {
    Json(json!({}))
}

async fn require_token(req: Request, next: Next) -> Response {
    let expected = format!("Bearer {TOKEN}");
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    next.run(req).await
}

async fn login(State(shared): State<AppState>) -> Response {
    shared.logins.fetch_add(1, Ordering::SeqCst);
    if shared.reject_login.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid credentials" })),
        )
            .into_response();
    }
    Json(json!({ "token": TOKEN })).into_response()
}

async fn socket_upgrade(ws: WebSocketUpgrade, State(shared): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, shared))
}

async fn serve_socket(mut socket: WebSocket, shared: AppState) {
    shared.sockets.fetch_add(1, Ordering::SeqCst);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    *shared.current.lock().unwrap() = Some(out_tx);

    let open = r#"0{"sid":"mock","pingInterval":25000}"#;
    if socket.send(Message::Text(open.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if text.as_str() == "40" {
                        let _ = socket.send(Message::Text(r#"40{"sid":"ns"}"#.into())).await;
                    }
                    let _ = shared.frames.send(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            outgoing = out_rx.recv() => match outgoing {
                Some(Outgoing::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
