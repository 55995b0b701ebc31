//! Chat-completion wire types and the upstream seam.
//!
//! [`Upstream`] is the one place the proxy talks to a model provider.
//! [`OpenRouterClient`] is the production implementation; tests substitute
//! their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::StatusCode;

mod openrouter;

pub use openrouter::{OPENROUTER_URL, OpenRouterClient};

/// Sampling temperature sent with every completion request.
pub const TEMPERATURE: f64 = 0.7;
/// Nucleus sampling cutoff sent with every completion request.
pub const TOP_P: f64 = 1.0;
/// Completion length cap sent with every completion request.
pub const MAX_TOKENS: u32 = 1000;

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A validated chat request: a non-empty model id and a non-empty history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Body sent to the upstream completion endpoint.
///
/// Generation parameters are fixed; callers only choose the model and history.
#[derive(Debug, Serialize)]
pub struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
}

impl<'a> CompletionPayload<'a> {
    pub fn new(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            model,
            messages,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
            stream: false,
        }
    }

    pub fn model(&self) -> &str {
        self.model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages
    }
}

/// Status and raw body of an upstream response, whatever the status.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: String,
}

/// The upstream could not be reached or its body could not be read.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UpstreamError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self(Box::new(err))
    }
}

/// A chat-completion provider.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issues one completion request authorized with `api_key`.
    ///
    /// Any HTTP status counts as a reply; only transport failures are errors.
    async fn complete(
        &self,
        api_key: &str,
        payload: &CompletionPayload<'_>,
    ) -> Result<UpstreamReply, UpstreamError>;
}
