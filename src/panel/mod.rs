//! Multi-panel chat orchestration.
//!
//! Each [`Panel`] is bound to one model and owns its transcript. The
//! [`Orchestrator`] holds every panel and fans a prompt out to all of them at
//! once; panels never share transcripts, and one panel failing never affects
//! another.
//!
//! Every transcript change is written straight to the [`Store`] under
//! `chat:<model id>`, and panels rehydrate from the same key when opened.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::llm::ChatMessage;

mod backend;
mod store;

pub use backend::{BackendError, ChatBackend, HttpBackend};
pub use store::{FileStore, MemoryStore, Store, StoreError};

/// Transcript entry used when the proxy answers without any choice.
pub const NO_REPLY: &str = "(no reply)";

/// A model offered as a panel: upstream id plus display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

const DEFAULT_MODELS: &[(&str, &str)] = &[
    ("openai/gpt-oss-20b:free", "GPT-4o (OpenAI)"),
    ("google/gemma-3-12b-it:free", "Gemini 3 12b"),
    ("meta-llama/llama-3.2-3b-instruct:free", "Meta: Llama 3.2 3b"),
    ("mistralai/mistral-7b-instruct:free", "Mistral 7B"),
    ("qwen/qwen3-8b:free", "Qwen 3-8b"),
    ("deepseek/deepseek-chat-v3.1:free", "DeepSeek V3.1"),
];

/// The stock panel line-up.
pub fn default_models() -> Vec<ModelSpec> {
    DEFAULT_MODELS
        .iter()
        .map(|(id, name)| ModelSpec::new(*id, *name))
        .collect()
}

/// Store key for a model's transcript.
pub fn storage_key(model_id: &str) -> String {
    format!("chat:{model_id}")
}

/// Whether a panel is waiting on the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    Sending,
}

/// One model's conversation.
pub struct Panel {
    model: ModelSpec,
    transcript: Vec<ChatMessage>,
    state: watch::Sender<PanelState>,
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn Store>,
}

impl Panel {
    /// Creates a panel, restoring its transcript from `store`.
    ///
    /// A missing, unreadable, or malformed stored value yields an empty
    /// transcript.
    pub fn open(model: ModelSpec, backend: Arc<dyn ChatBackend>, store: Arc<dyn Store>) -> Self {
        let transcript = rehydrate(store.as_ref(), &model.id);
        let (state, _) = watch::channel(PanelState::Idle);
        Self {
            model,
            transcript,
            state,
            backend,
            store,
        }
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn state(&self) -> PanelState {
        *self.state.borrow()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PanelState::Sending
    }

    /// Watches the panel's state, e.g. to show a "Thinking..." indicator.
    pub fn subscribe(&self) -> watch::Receiver<PanelState> {
        self.state.subscribe()
    }

    /// Sends `prompt` with the full history and records the outcome.
    ///
    /// Blank prompts are ignored. Failures never escape: they are appended as
    /// an assistant message starting with `"Error: "`. The panel is back to
    /// [`PanelState::Idle`] when this returns.
    pub async fn send_message(&mut self, prompt: &str) {
        if prompt.trim().is_empty() {
            return;
        }

        self.push(ChatMessage::user(prompt));
        self.state.send_replace(PanelState::Sending);

        let reply = match self.backend.chat(&self.model.id, &self.transcript).await {
            Ok(Some(message)) => message,
            Ok(None) => ChatMessage::assistant(NO_REPLY),
            Err(e) => {
                warn!(model = %self.model.id, error = %e, "panel send failed");
                ChatMessage::assistant(format!("Error: {e}"))
            }
        };

        self.push(reply);
        self.state.send_replace(PanelState::Idle);
    }

    /// Sends text typed into this panel alone; surrounding whitespace is dropped.
    pub async fn send_local(&mut self, input: &str) {
        self.send_message(input.trim()).await;
    }

    /// Empties the transcript and deletes its stored copy.
    pub fn clear(&mut self) {
        self.transcript.clear();
        if let Err(e) = self.store.remove(&storage_key(&self.model.id)) {
            warn!(model = %self.model.id, error = %e, "failed to remove stored transcript");
        }
    }

    fn push(&mut self, message: ChatMessage) {
        self.transcript.push(message);
        self.persist();
    }

    fn persist(&self) {
        let key = storage_key(&self.model.id);
        let result = serde_json::to_string(&self.transcript)
            .map_err(StoreError::from)
            .and_then(|encoded| self.store.save(&key, &encoded));
        if let Err(e) = result {
            warn!(model = %self.model.id, error = %e, "failed to persist transcript");
        }
    }
}

fn rehydrate(store: &dyn Store, model_id: &str) -> Vec<ChatMessage> {
    let raw = match store.load(&storage_key(model_id)) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(model = %model_id, error = %e, "failed to read stored transcript");
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        debug!(model = %model_id, error = %e, "ignoring malformed stored transcript");
        Vec::new()
    })
}

/// Owns every panel and dispatches prompts to them.
pub struct Orchestrator {
    panels: Vec<Panel>,
}

impl Orchestrator {
    /// Opens one panel per model, all sharing `backend` and `store`.
    pub fn new(
        models: impl IntoIterator<Item = ModelSpec>,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn Store>,
    ) -> Self {
        let panels = models
            .into_iter()
            .map(|model| Panel::open(model, Arc::clone(&backend), Arc::clone(&store)))
            .collect();
        Self { panels }
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, model_id: &str) -> Option<&Panel> {
        self.panels.iter().find(|p| p.model.id == model_id)
    }

    pub fn panel_mut(&mut self, model_id: &str) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|p| p.model.id == model_id)
    }

    /// Sends `prompt` to every panel concurrently and waits for all of them.
    ///
    /// Completion order across panels is unspecified.
    pub async fn send_to_all(&mut self, prompt: &str) {
        if prompt.trim().is_empty() {
            return;
        }
        join_all(self.panels.iter_mut().map(|panel| panel.send_message(prompt))).await;
    }

    /// Clears one panel. Returns `false` if no panel has that model id.
    pub fn clear_panel(&mut self, model_id: &str) -> bool {
        match self.panel_mut(model_id) {
            Some(panel) => {
                panel.clear();
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&mut self) {
        self.panels.iter_mut().for_each(Panel::clear);
    }
}
