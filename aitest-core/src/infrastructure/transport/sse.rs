//! Legacy MCP event-stream binding: responses arrive on a long-lived SSE
//! stream, requests are POSTed to the endpoint the stream announces.

use super::error::TransportError;
use super::pending::PendingRequests;
use super::{Transport, header_map, server_request_reply};
use crate::config::{ServerConfig, ServerEndpoint, TransportKind};
use crate::rpc::{Inbound, RpcRequest};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource, retry::Never};
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

pub struct SseTransport {
    server: String,
    http: reqwest::Client,
    headers: HeaderMap,
    post_url: Url,
    pending: PendingRequests,
    closed: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Open the stream and wait for the server to announce its POST endpoint.
    pub async fn connect(config: &ServerConfig) -> Result<Self, TransportError> {
        let ServerEndpoint::Sse { url, headers } = &config.endpoint else {
            return Err(connect_error(
                &config.name,
                "server is not configured for the sse transport",
            ));
        };
        let server = config.name.clone();
        let stream_url =
            Url::parse(url).map_err(|err| connect_error(&server, format!("invalid url '{url}': {err}")))?;
        let headers = header_map(&server, headers)?;
        let http = reqwest::Client::new();

        let request = http
            .get(stream_url.clone())
            .headers(headers.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let mut events = EventSource::new(request)
            .map_err(|err| connect_error(&server, format!("cannot open event stream: {err}")))?;
        events.set_retry_policy(Box::new(Never));

        let endpoint = tokio::time::timeout(config.startup_timeout, wait_for_endpoint(&server, &mut events))
            .await
            .map_err(|_| TransportError::Timeout {
                server: server.clone(),
                method: ENDPOINT_EVENT.to_string(),
                after: config.startup_timeout,
            })??;
        let post_url = stream_url
            .join(endpoint.trim())
            .map_err(|err| connect_error(&server, format!("invalid endpoint '{endpoint}': {err}")))?;
        info!(server = %server, endpoint = %post_url, "Connected to MCP event stream");

        let pending = PendingRequests::new(&server);
        let reader = tokio::spawn(reader_loop(
            server.clone(),
            events,
            pending.clone(),
            Poster {
                server: server.clone(),
                http: http.clone(),
                headers: headers.clone(),
                url: post_url.clone(),
            },
        ));

        Ok(Self {
            server,
            http,
            headers,
            post_url,
            pending,
            closed: AtomicBool::new(false),
            reader: Mutex::new(Some(reader)),
        })
    }

    fn poster(&self) -> Poster {
        Poster {
            server: self.server.clone(),
            http: self.http.clone(),
            headers: self.headers.clone(),
            url: self.post_url.clone(),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                server: self.server.clone(),
            });
        }
        let guard = self.pending.register()?;
        self.poster()
            .post(&RpcRequest::call(guard.id(), method, params))
            .await?;
        guard.wait().await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.poster()
            .post(&RpcRequest::notification(method, params))
            .await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pending.fail_all(|server| TransportError::Closed {
            server: server.to_string(),
        });
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = reader {
            // Aborting drops the event source and with it the connection.
            handle.abort();
        }
        debug!(server = %self.server, "Closed MCP event stream");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.pending.is_closed()
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(handle) = self
            .reader
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

#[derive(Clone)]
struct Poster {
    server: String,
    http: reqwest::Client,
    headers: HeaderMap,
    url: Url,
}

impl Poster {
    async fn post<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        self.http
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| TransportError::Http {
                server: self.server.clone(),
                source,
            })?;
        Ok(())
    }
}

async fn wait_for_endpoint(server: &str, events: &mut EventSource) -> Result<String, TransportError> {
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Open) => debug!(server, "event stream opened"),
            Ok(Event::Message(message)) if message.event == ENDPOINT_EVENT => {
                return Ok(message.data);
            }
            Ok(Event::Message(message)) => {
                debug!(server, event = %message.event, "ignoring event before endpoint announcement");
            }
            Err(err) => {
                events.close();
                return Err(connect_error(server, format!("event stream failed: {err}")));
            }
        }
    }
    Err(connect_error(
        server,
        "event stream ended before announcing an endpoint",
    ))
}

async fn reader_loop(server: String, mut events: EventSource, pending: PendingRequests, poster: Poster) {
    while let Some(event) = events.next().await {
        let message = match event {
            Ok(Event::Open) => continue,
            Ok(Event::Message(message)) => message,
            Err(err) => {
                warn!(server = %server, %err, "MCP event stream failed");
                break;
            }
        };
        if message.event != MESSAGE_EVENT && !message.event.is_empty() {
            debug!(server = %server, event = %message.event, "ignoring event");
            continue;
        }
        let value = match serde_json::from_str::<Value>(&message.data) {
            Ok(value) => value,
            Err(source) => {
                warn!(server = %server, %source, "received invalid JSON from MCP server");
                continue;
            }
        };
        match Inbound::classify(value) {
            Some(Inbound::Response { id, outcome }) => {
                pending.resolve(&id, outcome);
            }
            Some(Inbound::Request { id, method, .. }) => {
                let reply = server_request_reply(&server, id, &method);
                let poster = poster.clone();
                tokio::spawn(async move {
                    if let Err(err) = poster.post(&reply).await {
                        debug!(server = %poster.server, %err, "failed to answer server request");
                    }
                });
            }
            Some(Inbound::Notification { method, .. }) => {
                debug!(server = %server, %method, "received notification from server");
            }
            None => {}
        }
    }
    events.close();
    pending.fail_all(|server| TransportError::Terminated {
        server: server.to_string(),
    });
}

fn connect_error(server: &str, message: impl Into<String>) -> TransportError {
    TransportError::Connect {
        server: server.to_string(),
        message: message.into(),
    }
}
