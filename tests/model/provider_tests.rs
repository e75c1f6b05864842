// Provider tests - OpenAI-compatible HTTP backend through DynamicModelProvider
//
// An in-process chat completions endpoint replays canned replies so error
// classification and response decoding run over real HTTP.

use aitest_core::model::{ModelError, ModelProvider, ModelRequest, credentials};
use aitest_core::model::{CredentialProvider, DynamicModelProvider};
use aitest_core::{ChatMessage, ToolDescriptor};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use serial_test::serial;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// One canned reply for `/chat/completions`.
struct Reply {
    status: StatusCode,
    headers: Vec<(&'static str, &'static str)>,
    body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body,
        }
    }

    fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: json!({ "error": { "message": status.to_string() } }),
        }
    }

    fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

#[derive(Default)]
struct CompletionState {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(Option<String>, Value)>>,
}

struct CompletionStub {
    base_url: String,
    state: Arc<CompletionState>,
    task: JoinHandle<()>,
}

impl CompletionStub {
    async fn spawn(replies: impl IntoIterator<Item = Reply>) -> Self {
        let state = Arc::new(CompletionState {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::default(),
        });
        let app = Router::new()
            .route("/chat/completions", post(complete))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind completion stub");
        let address = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("completion stub");
        });
        Self {
            base_url: format!("http://{address}"),
            state,
            task,
        }
    }

    /// `(authorization, body)` of every request received so far.
    fn requests(&self) -> Vec<(Option<String>, Value)> {
        self.state.requests.lock().expect("requests lock").clone()
    }

    fn credentials(&self) -> CredentialProvider {
        CredentialProvider::new()
            .with_openai_key("sk-test")
            .with_openai_base_url(&self.base_url)
    }
}

impl Drop for CompletionStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn complete(
    State(state): State<Arc<CompletionState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().expect("requests lock").push((authorization, body));

    let Some(reply) = state.replies.lock().expect("replies lock").pop_front() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "no reply queued").into_response();
    };
    let mut response = (reply.status, Json(reply.body)).into_response();
    for (name, value) in reply.headers {
        response
            .headers_mut()
            .insert(name, value.parse().expect("header value"));
    }
    response
}

fn request() -> ModelRequest {
    ModelRequest::new(
        "openai/gpt-4o-mini",
        vec![
            ChatMessage::system("You look up weather."),
            ChatMessage::user("Weather in Paris?"),
        ],
    )
}

#[tokio::test]
#[serial]
async fn rate_limit_carries_retry_after() {
    let stub = CompletionStub::spawn([
        Reply::status(StatusCode::TOO_MANY_REQUESTS).with_header("retry-after", "2"),
    ])
    .await;
    credentials::install(stub.credentials());

    let err = DynamicModelProvider::new()
        .complete(request())
        .await
        .expect_err("429 is an error");
    credentials::teardown();

    assert!(matches!(err, ModelError::RateLimited { ref provider, .. } if provider == "openai"));
    assert!(err.is_retryable());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
}

#[tokio::test]
#[serial]
async fn server_errors_are_retryable_http_failures() {
    let stub = CompletionStub::spawn([Reply::status(StatusCode::SERVICE_UNAVAILABLE)]).await;
    credentials::install(stub.credentials());

    let err = DynamicModelProvider::new()
        .complete(request())
        .await
        .expect_err("503 is an error");
    credentials::teardown();

    assert!(matches!(err, ModelError::Http { status: 503, .. }), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(err.retry_after(), None);
}

#[tokio::test]
#[serial]
async fn client_errors_are_not_retried() {
    let stub = CompletionStub::spawn([Reply::status(StatusCode::UNAUTHORIZED)]).await;
    credentials::install(stub.credentials());

    let err = DynamicModelProvider::new()
        .complete(request())
        .await
        .expect_err("401 is an error");
    credentials::teardown();

    assert!(matches!(err, ModelError::Http { status: 401, .. }), "got {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
#[serial]
async fn tool_call_completion_is_decoded() {
    let stub = CompletionStub::spawn([Reply::ok(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_weather",
                    "type": "function",
                    "function": {
                        "name": "get_weather",
                        "arguments": "{\"city\":\"Paris\"}"
                    }
                }]
            }
        }],
        "usage": { "prompt_tokens": 31, "completion_tokens": 9, "total_tokens": 40 }
    }))])
    .await;
    credentials::install(stub.credentials());

    let tool = ToolDescriptor::new("get_weather")
        .with_description("Current weather for a city")
        .with_schema(json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        }));
    let response = DynamicModelProvider::new()
        .complete(request().with_tools(vec![tool]))
        .await
        .expect("completion");
    credentials::teardown();

    assert!(response.wants_tools());
    assert!(response.text.is_empty());
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_weather");
    assert_eq!(response.tool_calls[0].name, "get_weather");
    assert_eq!(response.tool_calls[0].arguments, json!({ "city": "Paris" }));
    assert_eq!(response.usage.prompt, 31);
    assert_eq!(response.usage.completion, 9);

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let (authorization, body) = &requests[0];
    assert_eq!(authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][1]["content"], "Weather in Paris?");
    assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
}

#[tokio::test]
#[serial]
async fn missing_credentials_fail_before_any_request() {
    let stub = CompletionStub::spawn(Vec::new()).await;
    credentials::teardown();

    let err = DynamicModelProvider::new()
        .complete(request())
        .await
        .expect_err("no credentials installed");

    assert!(matches!(err, ModelError::CredentialsNotInitialized));
    assert!(!err.is_retryable());
    assert!(stub.requests().is_empty());
}
