//! Model Adapter: a single `invoke` operation against an external LLM
//! service. Parsing and schema validation belong to the caller (the
//! classifier, the Memory/Repository processors) — this adapter returns raw
//! text.

use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Calls an LLM with a prompt and returns its raw text response.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn invoke(&self, prompt: &str, max_tokens: u32, timeout: Duration) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    text: String,
}

/// HTTP-backed [`ModelAdapter`] posting to an OpenAI-compatible completions
/// endpoint. Non-streaming — routing only needs one shot, so there is no SSE
/// parsing here unlike a conversational client.
pub struct HttpModelAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpModelAdapter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ModelAdapter for HttpModelAdapter {
    async fn invoke(&self, prompt: &str, max_tokens: u32, timeout: Duration) -> Result<String> {
        let config = RetryConfig::model_call();
        let call = || async {
            let request = CompletionRequest {
                model: &self.model,
                prompt,
                max_tokens,
            };

            let response = self
                .client
                .post(format!("{}/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
                .map_err(Error::Http)?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(Error::model("throttled"));
            }
            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::model(format!("model call rejected: {status}: {body}")));
            }
            if !status.is_success() {
                return Err(Error::model(format!("model call failed: {status}")));
            }

            let body: CompletionResponse = response.json().await.map_err(Error::Http)?;
            Ok(body.text)
        };

        tokio::time::timeout(timeout, retry_with_backoff_conditional(config, call))
            .await
            .map_err(|_| Error::timeout("model call exceeded deadline"))?
    }
}

/// Test double returning a canned or closure-computed string, used to test
/// classifier content-mode handling without a live model behind it.
pub struct FakeModelAdapter {
    response: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
}

impl FakeModelAdapter {
    pub fn constant(response: impl Into<String>) -> Self {
        let response = response.into();
        Self {
            response: Box::new(move |_| Ok(response.clone())),
        }
    }

    pub fn from_fn(f: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            response: Box::new(f),
        }
    }
}

#[async_trait]
impl ModelAdapter for FakeModelAdapter {
    async fn invoke(&self, prompt: &str, _max_tokens: u32, _timeout: Duration) -> Result<String> {
        (self.response)(prompt)
    }
}
