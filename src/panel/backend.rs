//! How panels reach the chat proxy.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{ChatMessage, ChatRequest};

/// Why a panel did not get a reply. Rendered into the transcript as
/// `"Error: <display>"`.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("malformed reply: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Sends one panel's history for one model and returns the first choice's
/// message, or `None` when the reply has no usable choice.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Option<ChatMessage>, BackendError>;
}

/// [`ChatBackend`] that posts to a running proxy's `/api/chat`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    chat_url: String,
}

impl HttpBackend {
    /// `base_url` is the proxy origin, e.g. `http://localhost:3030`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Option<ChatMessage>, BackendError> {
        let request = ChatRequest {
            model: model.to_owned(),
            messages: messages.to_vec(),
        };
        let response = self.http.post(&self.chat_url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let data: Value = serde_json::from_str(&body)?;
        Ok(first_choice(&data))
    }
}

fn first_choice(data: &Value) -> Option<ChatMessage> {
    let message = data.pointer("/choices/0/message")?;
    serde_json::from_value(message.clone()).ok()
}

/// Best human-readable message in a proxy error body.
///
/// Looks at `details` (string), then an OpenRouter-style
/// `details.error.message`, then the `error` tag, then the raw text.
fn error_message(body: &str) -> String {
    let fallback = || {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "request failed".to_owned()
        } else {
            trimmed.to_owned()
        }
    };
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return fallback();
    };
    value
        .get("details")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/details/error/message").and_then(Value::as_str))
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map_or_else(fallback, str::to_owned)
}
