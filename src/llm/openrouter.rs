use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{CompletionPayload, Upstream, UpstreamError, UpstreamReply};
use crate::StatusCode;

/// OpenRouter's OpenAI-compatible completion endpoint.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Application name OpenRouter attributes traffic to.
const APP_TITLE: &str = "Multi AI Lab";

/// [`Upstream`] backed by OpenRouter over HTTPS.
///
/// No timeout is configured; a request runs until the transport gives up.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    endpoint: String,
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenRouterClient {
    pub fn new() -> Self {
        Self::with_endpoint(OPENROUTER_URL)
    }

    /// Points the client at a different completion URL, such as a local stand-in.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Upstream for OpenRouterClient {
    async fn complete(
        &self,
        api_key: &str,
        payload: &CompletionPayload<'_>,
    ) -> Result<UpstreamReply, UpstreamError> {
        debug!(endpoint = %self.endpoint, model = payload.model(), "posting completion");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("X-Title", APP_TITLE)
            .json(payload)
            .send()
            .await?;

        let status = StatusCode::from_u16(response.status().as_u16());
        let body = response.text().await?;

        Ok(UpstreamReply { status, body })
    }
}
