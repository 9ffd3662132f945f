//! Message dispatch.
//!
//! Sending is optimistic: the message is appended locally with a
//! client-minted id and shown immediately; the authoritative copy arrives
//! with the next poll. The poller is suspended for the duration of the round
//! trip so a tick's snapshot replacement can't race the append, and resumed
//! unconditionally when the send settles.
//!
//! A failed send deliberately leaves the optimistic message in place until
//! the next successful poll replaces the list: an accepted, visible
//! inconsistency window, not something to paper over with merge-by-id logic.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::api::ChatApi;
use crate::api::types::{ChatMessage, SendMessageRequest};
use crate::chat::poller::PollGate;
use crate::chat::state::SharedConversation;
use crate::error::Notice;

/// What became of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Precondition failed (blank message, or a send already in flight).
    /// Deliberately silent.
    Ignored,
    /// The backend accepted the message. Carries the newly assigned session
    /// identifier when this was the first message of a new session.
    Sent { adopted_chat_id: Option<String> },
    /// The backend rejected the message; a notice was pushed and the
    /// optimistic copy stays until the next poll reconciles it.
    Failed,
}

/// Sends user messages and coordinates the poller around them.
pub struct MessageDispatcher {
    api: Arc<dyn ChatApi>,
    gate: Arc<PollGate>,
    chain_id: u64,
}

impl MessageDispatcher {
    pub fn new(api: Arc<dyn ChatApi>, gate: Arc<PollGate>, chain_id: u64) -> Self {
        Self {
            api,
            gate,
            chain_id,
        }
    }

    pub async fn dispatch(
        &self,
        conversation: &SharedConversation,
        notices: &mpsc::UnboundedSender<Notice>,
        text: &str,
    ) -> DispatchOutcome {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return DispatchOutcome::Ignored;
        }
        if !self.gate.try_suspend() {
            // A previous send hasn't settled yet.
            return DispatchOutcome::Ignored;
        }

        let now = Utc::now();
        let chat_id = conversation.chat_id().await;
        let optimistic = ChatMessage {
            id: now.timestamp_millis().to_string(),
            chat_id: chat_id.clone().unwrap_or_default(),
            agent_id: None,
            content: trimmed.to_string(),
            created_at: now,
            updated_at: now,
        };
        conversation
            .mutate(|state| state.push_optimistic(optimistic))
            .await;

        let result = self
            .api
            .send_message(SendMessageRequest {
                message: trimmed.to_string(),
                chat_id: chat_id.clone().unwrap_or_default(),
                chain_id: self.chain_id,
            })
            .await;
        self.gate.resume();

        match result {
            Ok(response) => {
                let adopted_chat_id = if chat_id.is_none() && !response.chat_id.is_empty() {
                    conversation
                        .mutate(|state| state.adopt_session(response.chat_id.clone()))
                        .await;
                    Some(response.chat_id)
                } else {
                    None
                };
                DispatchOutcome::Sent { adopted_chat_id }
            }
            Err(e) => {
                tracing::warn!("failed to send message: {e}");
                let _ = notices.send(Notice::error(
                    "Failed to send message. Please try again.".to_string(),
                ));
                DispatchOutcome::Failed
            }
        }
    }
}
