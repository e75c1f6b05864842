//! Base HTTP client with shared logic

use crate::infrastructure::model::types::ModelError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// How a backend expects to be authenticated.
#[derive(Clone)]
pub enum AuthScheme {
    Bearer(String),
    /// Azure-style `api-key` header.
    ApiKeyHeader(String),
    None,
}

/// Base HTTP client with shared functionality
#[derive(Clone)]
pub struct HttpClientBase {
    pub id: String,
    pub endpoint: String,
    pub auth: AuthScheme,
    pub http: Client,
}

impl HttpClientBase {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, auth: AuthScheme, http: Client) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            auth,
            http,
        }
    }

    /// Build URL from endpoint and path
    pub fn build_url(&self, path: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            AuthScheme::Bearer(key) => builder.bearer_auth(key),
            AuthScheme::ApiKeyHeader(key) => builder.header("api-key", key),
            AuthScheme::None => builder,
        }
    }

    /// POST JSON and decode the JSON reply, classifying HTTP failures.
    pub async fn post_json<Req, Res>(&self, url: &str, body: &Req) -> Result<Res, ModelError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let response = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::network(&self.id, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            return Err(ModelError::rate_limited(&self.id, retry_after));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::http(&self.id, status, crate::summarise(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| ModelError::invalid_response(&self.id, e.to_string()))
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
}
