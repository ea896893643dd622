use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ChatError;
use crate::events::{Conversation, Message};
use crate::image;
use crate::llm::{LlmClient, LlmRequest};
use crate::storage::ConversationStore;

/// "A generation is in progress" flag.
///
/// Requests arriving while the flag is set are rejected, never queued.
#[derive(Debug, Clone, Default)]
pub struct GenerationGate {
    busy: Arc<AtomicBool>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate; `None` when a generation already holds it
    pub fn try_begin(&self) -> Option<GenerationGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GenerationGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_generating(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Reopens the gate when dropped
#[derive(Debug)]
pub struct GenerationGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Result of a send that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send: empty text and no attachment
    Ignored,
    /// The model's complete reply, already appended to the conversation
    Reply(String),
}

/// Application state owned by the front end: settings, history, the active
/// conversation and the generation gate.
pub struct App {
    config: Config,
    store: ConversationStore,
    client: LlmClient,
    current_chat_id: String,
    pending_image: Option<String>,
    gate: GenerationGate,
}

impl App {
    /// Load history and open the most recent conversation, creating one when
    /// there is none yet
    pub fn new(config: Config) -> Result<Self> {
        let mut store = ConversationStore::load(config.chats_path())?;
        let current_chat_id = match store.most_recent() {
            Some(chat) => chat.id.clone(),
            None => store.new_conversation()?,
        };
        let client = LlmClient::new(&config)?;

        Ok(Self {
            config,
            store,
            client,
            current_chat_id,
            pending_image: None,
            gate: GenerationGate::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Model the next request goes to
    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn gate(&self) -> &GenerationGate {
        &self.gate
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.store.get(&self.current_chat_id)
    }

    pub fn pending_image(&self) -> Option<&str> {
        self.pending_image.as_deref()
    }

    pub fn start_new_chat(&mut self) -> Result<&Conversation> {
        self.current_chat_id = self.store.new_conversation()?;
        self.pending_image = None;
        self.current_conversation()
            .ok_or_else(|| anyhow::anyhow!("New conversation was not stored"))
    }

    /// Switch to a saved conversation by listing number or id
    pub fn open_chat(&mut self, key: &str) -> std::result::Result<&Conversation, ChatError> {
        let id = self
            .store
            .resolve(key)
            .map(|chat| chat.id.clone())
            .ok_or_else(|| ChatError::UnknownConversation(key.to_string()))?;
        self.current_chat_id = id;
        self.pending_image = None;
        self.current_conversation()
            .ok_or_else(|| ChatError::UnknownConversation(key.to_string()))
    }

    pub fn attach_image(&mut self, path: &Path) -> Result<()> {
        self.pending_image = Some(image::load_image(path)?);
        Ok(())
    }

    pub fn clear_image(&mut self) {
        self.pending_image = None;
    }

    /// Apply a settings change, persist it, and rebuild the client so the next
    /// request uses it
    pub fn update_config(&mut self, change: impl FnOnce(&mut Config)) -> Result<()> {
        change(&mut self.config);
        self.config.save()?;
        self.client = LlmClient::new(&self.config)?;
        Ok(())
    }

    /// Send one user turn and stream the reply.
    ///
    /// The user message is stored before the request goes out; the reply is
    /// stored only when the stream completes.
    pub async fn send_message<F>(
        &mut self,
        text: &str,
        on_progress: F,
    ) -> std::result::Result<SendOutcome, ChatError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() && self.pending_image.is_none() {
            return Ok(SendOutcome::Ignored);
        }

        let _guard = self.gate.try_begin().ok_or(ChatError::Busy)?;

        if !self.config.has_api_key() {
            return Err(ChatError::MissingApiKey);
        }

        let mut message = Message::user(text);
        if let Some(image) = self.pending_image.clone() {
            message = message.with_image(image);
        }

        let chat_id = self.current_chat_id.clone();
        self.store.append(&chat_id, message)?;
        self.pending_image = None;

        let history = self
            .store
            .get(&chat_id)
            .map(|chat| chat.messages.clone())
            .ok_or_else(|| ChatError::UnknownConversation(chat_id.clone()))?;

        let request = LlmRequest::new(history)
            .with_system_instruction(self.config.system_instruction.clone())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_output_tokens);

        match self.client.generate(&request, on_progress).await {
            Ok(reply) => {
                self.store.append(&chat_id, Message::model(reply.clone()))?;
                info!(chat = %chat_id, chars = reply.chars().count(), "reply stored");
                Ok(SendOutcome::Reply(reply))
            }
            Err(err) => {
                warn!(chat = %chat_id, error = %err, "generation failed");
                Err(err)
            }
        }
    }
}
