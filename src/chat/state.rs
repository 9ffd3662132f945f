//! Conversation state container.
//!
//! One struct owns everything the chat view renders: the message list, the
//! action list, the per-agent state descriptions, and the session identifier.
//! It is mutated from exactly two places (the transcript poller's wholesale
//! snapshot replacement and the dispatcher's single optimistic append) and
//! never from both at once, because the dispatcher suspends the poller for
//! the duration of its round trip.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::api::types::{ChatAction, ChatHistoryResponse, ChatMessage};

/// Mutable state of one chat conversation.
#[derive(Debug, Default)]
pub struct ConversationState {
    pub chat_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub actions: Vec<ChatAction>,
    /// agent id → free-text state description from the backend.
    pub agent_states: HashMap<String, String>,
    revision: u64,
}

impl ConversationState {
    pub fn new(chat_id: Option<String>) -> Self {
        Self {
            chat_id,
            ..Default::default()
        }
    }

    /// Monotonic counter bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the local collections with the backend's view.
    ///
    /// No merge-by-id: a snapshot that races a local optimistic append
    /// overwrites it once the server catches up. Optimistic state is a
    /// bridge until the next tick, nothing more.
    pub fn apply_snapshot(&mut self, history: ChatHistoryResponse) {
        self.messages = history.messages;
        self.actions = history.actions;
        self.agent_states = history
            .agents
            .into_iter()
            .map(|agent| (agent.agent_id, agent.state_description))
            .collect();
        self.revision += 1;
    }

    /// Append a locally minted message ahead of server confirmation.
    pub fn push_optimistic(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.revision += 1;
    }

    /// Adopt a server-assigned session identifier. Only the first successful
    /// send of a session-less conversation gets here.
    pub fn adopt_session(&mut self, chat_id: String) {
        self.chat_id = Some(chat_id);
        self.revision += 1;
    }

    /// Point at a different session (or none), dropping every collection.
    /// The next fetch repopulates them for the new identifier.
    pub fn switch_session(&mut self, chat_id: Option<String>) {
        self.chat_id = chat_id;
        self.messages.clear();
        self.actions.clear();
        self.agent_states.clear();
        self.revision += 1;
    }

    pub fn action(&self, id: &str) -> Option<&ChatAction> {
        self.actions.iter().find(|action| action.id == id)
    }

    /// Actions currently awaiting user review, in timeline order.
    pub fn reviewing_actions(&self) -> impl Iterator<Item = &ChatAction> {
        self.actions
            .iter()
            .filter(|action| action.state.is_reviewing())
    }
}

/// Shared handle to the conversation state plus a change-notification
/// channel. All mutation goes through [`SharedConversation::mutate`], which
/// publishes the new revision to subscribers.
#[derive(Clone)]
pub struct SharedConversation {
    inner: Arc<Mutex<ConversationState>>,
    updates: watch::Sender<u64>,
}

impl SharedConversation {
    pub fn new(chat_id: Option<String>) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(ConversationState::new(chat_id))),
            updates,
        }
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ConversationState) -> R) -> R {
        let guard = self.inner.lock().await;
        f(&guard)
    }

    pub async fn mutate<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let mut guard = self.inner.lock().await;
        let result = f(&mut guard);
        let _ = self.updates.send(guard.revision());
        result
    }

    /// Subscribe to revision bumps. The receiver sees the latest revision
    /// after any batch of mutations; intermediate values may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    pub async fn chat_id(&self) -> Option<String> {
        self.read(|state| state.chat_id.clone()).await
    }
}
