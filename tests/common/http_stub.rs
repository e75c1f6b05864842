// In-process MCP server exposing both network bindings:
//
//   GET  /sse       legacy event stream, announces /messages?session=N
//   POST /messages  requests for an event-stream session
//   POST /mcp       streamable HTTP (JSON replies, open event-stream for tools/call)
//   DELETE /mcp     session termination

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const SESSION_ID: &str = "stub-session";

#[derive(Default)]
struct StubState {
    streams: Mutex<HashMap<u64, mpsc::UnboundedSender<Event>>>,
    next_stream: AtomicU64,
    terminated: AtomicBool,
    last_authorization: Mutex<Option<String>>,
}

pub struct HttpStub {
    pub base_url: String,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl HttpStub {
    pub async fn spawn() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/sse", get(open_stream))
            .route("/messages", post(post_message))
            .route("/mcp", post(post_mcp).delete(delete_mcp))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let address = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });
        Self {
            base_url: format!("http://{address}"),
            state,
            task,
        }
    }

    pub fn sse_url(&self) -> String {
        format!("{}/sse", self.base_url)
    }

    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    /// Whether a client sent DELETE for its streamable HTTP session.
    pub fn session_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().expect("auth lock").clone()
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn respond(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2025-06-18",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "http-stub", "version": "0.1.0" },
            "instructions": "Use echo to repeat text."
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "echo",
                "description": "Return the given text",
                "inputSchema": {
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }
            }]
        }),
        "tools/call" => {
            let text = message
                .pointer("/params/arguments/text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            json!({ "content": [{ "type": "text", "text": text }], "isError": false })
        }
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {other}") }
            }));
        }
    };
    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

async fn open_stream(State(state): State<Arc<StubState>>) -> impl IntoResponse {
    let stream_id = state.next_stream.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(
        Event::default()
            .event("endpoint")
            .data(format!("/messages?session={stream_id}")),
    );
    state.streams.lock().expect("streams lock").insert(stream_id, tx);
    Sse::new(UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>))
}

async fn post_message(
    State(state): State<Arc<StubState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(message): Json<Value>,
) -> StatusCode {
    let Some(stream_id) = query.get("session").and_then(|id| id.parse::<u64>().ok()) else {
        return StatusCode::BAD_REQUEST;
    };
    let sender = state.streams.lock().expect("streams lock").get(&stream_id).cloned();
    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };
    if let Some(reply) = respond(&message) {
        let _ = sender.send(Event::default().event("message").data(reply.to_string()));
    }
    StatusCode::ACCEPTED
}

async fn post_mcp(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(message): Json<Value>,
) -> Response {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        *state.last_authorization.lock().expect("auth lock") = Some(auth.to_string());
    }
    let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
    let has_session = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == SESSION_ID);
    if method != "initialize" && !has_session {
        return (StatusCode::BAD_REQUEST, "missing session").into_response();
    }
    let Some(reply) = respond(&message) else {
        return StatusCode::ACCEPTED.into_response();
    };
    match method {
        "initialize" => ([("mcp-session-id", SESSION_ID)], Json(reply)).into_response(),
        "tools/call" => {
            // The stream stays open after the reply, like a server that
            // keeps pushing notifications.
            let events = [
                Event::default()
                    .event("message")
                    .data(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#),
                Event::default().event("message").data(reply.to_string()),
            ];
            Sse::new(
                futures::stream::iter(events)
                    .chain(futures::stream::pending())
                    .map(Ok::<_, Infallible>),
            )
            .into_response()
        }
        _ => Json(reply).into_response(),
    }
}

async fn delete_mcp(State(state): State<Arc<StubState>>) -> StatusCode {
    state.terminated.store(true, Ordering::SeqCst);
    StatusCode::OK
}
