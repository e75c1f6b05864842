//! Streamable HTTP binding: every message is its own POST and the reply is
//! either a JSON body or an event stream carrying the response.

use super::error::TransportError;
use super::{Transport, header_map, rpc_result, server_request_reply};
use crate::config::{ServerConfig, ServerEndpoint, TransportKind};
use crate::rpc::{Inbound, RpcRequest, numeric_id};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub const SESSION_HEADER: &str = "mcp-session-id";

pub struct StreamableHttpTransport {
    server: String,
    http: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    /// No I/O happens until the first request.
    pub fn connect(config: &ServerConfig) -> Result<Self, TransportError> {
        let ServerEndpoint::StreamableHttp { url, headers } = &config.endpoint else {
            return Err(TransportError::Connect {
                server: config.name.clone(),
                message: "server is not configured for the streamable-http transport".into(),
            });
        };
        let url = Url::parse(url).map_err(|err| TransportError::Connect {
            server: config.name.clone(),
            message: format!("invalid url '{url}': {err}"),
        })?;
        Ok(Self {
            server: config.name.clone(),
            http: reqwest::Client::new(),
            url,
            headers: header_map(&config.name, headers)?,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(session) = self.session_id()
            && let Ok(value) = HeaderValue::from_str(&session)
        {
            headers.insert(SESSION_HEADER, value);
        }
        headers
    }

    async fn post<T: Serialize>(&self, message: &T) -> Result<reqwest::Response, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                server: self.server.clone(),
            });
        }
        let response = self
            .http
            .post(self.url.clone())
            .headers(self.request_headers())
            .json(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| self.http_error(source))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            let mut current = self
                .session_id
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if current.as_deref() != Some(session) {
                debug!(server = %self.server, session, "MCP session established");
                *current = Some(session.to_string());
            }
        }
        Ok(response)
    }

    fn http_error(&self, source: reqwest::Error) -> TransportError {
        TransportError::Http {
            server: self.server.clone(),
            source,
        }
    }

    fn protocol_error(&self, message: impl Into<String>) -> TransportError {
        TransportError::Protocol {
            server: self.server.clone(),
            message: message.into(),
        }
    }

    /// Handle one message carried by a reply. Returns the outcome once the
    /// response to `id` arrives.
    async fn settle(&self, id: u64, value: Value) -> Option<Result<Value, TransportError>> {
        match Inbound::classify(value)? {
            Inbound::Response {
                id: response_id,
                outcome,
            } if numeric_id(&response_id) == Some(id) => {
                return Some(rpc_result(&self.server, outcome));
            }
            Inbound::Response { id: other, .. } => {
                debug!(server = %self.server, response_id = %other, "ignoring unrelated response");
            }
            Inbound::Request {
                id: request_id,
                method,
                ..
            } => {
                let reply = server_request_reply(&self.server, request_id, &method);
                if let Err(err) = self.post(&reply).await {
                    debug!(server = %self.server, %err, "failed to answer server request");
                }
            }
            Inbound::Notification { method, .. } => {
                debug!(server = %self.server, %method, "received notification from server");
            }
        }
        None
    }

    /// Read events as they arrive and stop at the response; the server may
    /// keep the stream open afterwards.
    async fn settle_stream(
        &self,
        id: u64,
        response: reqwest::Response,
    ) -> Result<Value, TransportError> {
        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|err| self.protocol_error(format!("event stream failed: {err}")))?;
            let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                debug!(server = %self.server, event = %event.event, "skipping non-JSON event");
                continue;
            };
            if let Some(outcome) = self.settle(id, value).await {
                return outcome;
            }
        }
        Err(self.no_response(id))
    }

    async fn settle_body(
        &self,
        id: u64,
        response: reqwest::Response,
    ) -> Result<Value, TransportError> {
        let body = response.text().await.map_err(|source| self.http_error(source))?;
        let messages = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(batch)) => batch,
            Ok(value) => vec![value],
            Err(source) => {
                return Err(TransportError::InvalidJson {
                    server: self.server.clone(),
                    source,
                });
            }
        };
        for value in messages {
            if let Some(outcome) = self.settle(id, value).await {
                return outcome;
            }
        }
        Err(self.no_response(id))
    }

    fn no_response(&self, id: u64) -> TransportError {
        self.protocol_error(format!("reply did not contain a response to request {id}"))
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self.post(&RpcRequest::call(id, method, params)).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        if is_stream {
            self.settle_stream(id, response).await
        } else {
            self.settle_body(id, response).await
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.post(&RpcRequest::notification(method, params)).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(session) = self.session_id() else {
            return;
        };
        let mut headers = self.headers.clone();
        if let Ok(value) = HeaderValue::from_str(&session) {
            headers.insert(SESSION_HEADER, value);
        }
        // Best effort.
        match self.http.delete(self.url.clone()).headers(headers).send().await {
            Ok(response) => {
                debug!(server = %self.server, status = %response.status(), "MCP session terminated");
            }
            Err(err) => debug!(server = %self.server, %err, "failed to terminate MCP session"),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
