//! The chat proxy: validate, authorize, forward, sanitize.
//!
//! [`ChatProxy::handle_chat`] is the whole contract. [`routes`] and [`app`]
//! mount it on the HTTP stack together with the health probe, access log and
//! CORS policy.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ProxyConfig;
use crate::context::Context;
use crate::llm::{ChatMessage, ChatRequest, CompletionPayload, Upstream};
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::security::CorsMiddleware;
use crate::{Response, Router, StatusCode};

mod sanitize;

pub use sanitize::sanitize;

/// Body of the health probe.
pub const HEALTH_MESSAGE: &str = "Multi-AI Lab API is running";

const MISSING_FIELDS: &str = "model and messages (array) are required";

/// Everything that can go wrong while handling a chat request.
///
/// Each variant maps to an HTTP status and an `{error, details}` JSON body;
/// none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request body does not have the required shape. Never reaches upstream.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No upstream credential is configured.
    #[error("API Key not configured on server")]
    ServerMisconfigured,

    /// Upstream answered with a non-success status; status and body are relayed.
    #[error("upstream returned {status}")]
    Upstream { status: StatusCode, body: String },

    /// Upstream could not be reached or answered with something unreadable.
    #[error("proxy error: {0}")]
    Proxy(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BadRequest,
            Self::ServerMisconfigured | Self::Proxy(_) => StatusCode::InternalServerError,
            Self::Upstream { status, .. } => *status,
        }
    }

    /// The `error` tag of the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ServerMisconfigured => "server_error",
            Self::Upstream { .. } => "UpstreamError",
            Self::Proxy(_) => "proxy_error",
        }
    }

    /// The `details` of the JSON body. Upstream bodies are embedded as JSON
    /// when they parse, otherwise as the raw string.
    pub fn details(&self) -> Value {
        match self {
            Self::InvalidRequest(details) | Self::Proxy(details) => Value::from(details.as_str()),
            Self::ServerMisconfigured => Value::from(self.to_string()),
            Self::Upstream { body, .. } => {
                serde_json::from_str(body).unwrap_or_else(|_| Value::from(body.as_str()))
            }
        }
    }

    pub fn into_response(self) -> Response {
        Response::json(
            self.status(),
            &json!({ "error": self.kind(), "details": self.details() }),
        )
    }
}

/// Stateless chat proxy. Safe to share across any number of concurrent requests.
pub struct ChatProxy {
    config: ProxyConfig,
    upstream: Arc<dyn Upstream>,
}

impl ChatProxy {
    pub fn new(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self { config, upstream }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handles one `/api/chat` body.
    ///
    /// On success returns the upstream JSON with the first choice's message
    /// content sanitized.
    ///
    /// # Errors
    ///
    /// See [`ProxyError`]; validation runs before the credential check, and
    /// both run before any upstream traffic.
    pub async fn handle_chat(&self, body: &[u8]) -> Result<Value, ProxyError> {
        let request = validate(body)?;
        let api_key = self
            .config
            .api_key()
            .ok_or(ProxyError::ServerMisconfigured)?;

        info!(model = %request.model, messages = request.messages.len(), "calling upstream");

        let payload = CompletionPayload::new(&request.model, &request.messages);
        let reply = self
            .upstream
            .complete(api_key, &payload)
            .await
            .map_err(|e| {
                error!(model = %request.model, error = %e, "upstream unreachable");
                ProxyError::Proxy(e.to_string())
            })?;

        if !reply.status.is_success() {
            error!(
                model = %request.model,
                status = reply.status.as_u16(),
                body = %reply.body,
                "upstream returned an error"
            );
            return Err(ProxyError::Upstream {
                status: reply.status,
                body: reply.body,
            });
        }

        let mut data: Value = serde_json::from_str(&reply.body).map_err(|e| {
            error!(model = %request.model, body = %reply.body, "upstream sent malformed JSON");
            ProxyError::Proxy(format!("upstream returned malformed JSON: {e}"))
        })?;

        if let Some(Value::String(content)) = data.pointer_mut("/choices/0/message/content") {
            *content = sanitize(content);
        }

        let has_choices = data
            .get("choices")
            .and_then(Value::as_array)
            .is_some_and(|choices| !choices.is_empty());
        if !has_choices {
            warn!(model = %request.model, body = %reply.body, "upstream returned no choices");
        }

        Ok(data)
    }
}

/// Checks the shape of a chat body and converts it into a [`ChatRequest`].
fn validate(body: &[u8]) -> Result<ChatRequest, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("body must be JSON: {e}")))?;

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .filter(|model| !model.is_empty())
        .ok_or_else(|| ProxyError::InvalidRequest(MISSING_FIELDS.into()))?;
    let raw_messages = value
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| ProxyError::InvalidRequest(MISSING_FIELDS.into()))?;
    if raw_messages.is_empty() {
        return Err(ProxyError::InvalidRequest("messages must not be empty".into()));
    }

    let messages = raw_messages
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let present = |field: &str| raw.get(field).is_some_and(|v| !v.is_null());
            if !present("role") || !present("content") {
                return Err(ProxyError::InvalidRequest(format!(
                    "messages[{i}] must have role and content"
                )));
            }
            ChatMessage::deserialize(raw)
                .map_err(|e| ProxyError::InvalidRequest(format!("messages[{i}]: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChatRequest {
        model: model.to_owned(),
        messages,
    })
}

/// Mounts the proxy's endpoints:
///
/// - `GET /api/health` — liveness probe.
/// - `POST /api/chat` — [`ChatProxy::handle_chat`].
pub fn routes(proxy: Arc<ChatProxy>) -> Router {
    let mut router = Router::new();

    router.get("/api/health", |_ctx: Context| async {
        Response::json(
            StatusCode::Ok,
            &json!({ "status": "ok", "message": HEALTH_MESSAGE }),
        )
    });

    router.post("/api/chat", move |ctx: Context| {
        let proxy = Arc::clone(&proxy);
        async move {
            match proxy.handle_chat(ctx.request().body()).await {
                Ok(data) => Response::json(StatusCode::Ok, &data),
                Err(e) => e.into_response(),
            }
        }
    });

    router
}

/// The full HTTP application: access log, CORS, then [`routes`].
pub fn app(proxy: Arc<ChatProxy>) -> Pipeline {
    Pipeline::new(routes(proxy))
        .with(LoggerMiddleware)
        .with(CorsMiddleware::new())
}
