//! Action confirmation.
//!
//! The backend owns the action lifecycle; this controller enforces the
//! client-side contract around it: only an action in the reviewing state may
//! be edited, confirmed, or rejected; at most one action has an open edit
//! buffer; at most one confirm/reject submission is in flight; a malformed
//! edited payload never reaches the wire.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::api::ChatApi;
use crate::api::types::{ChatAction, ConfirmActionRequest, ConfirmActionResponse};
use crate::error::{ApiError, ChatError};

/// The local draft of an action's transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    pub action_id: String,
    pub text: String,
}

/// Outcome of a confirm/reject submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// The backend rejected the submission; the edit buffer is preserved so
    /// the user doesn't lose their draft, and the gate is released for retry.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Tracks which action, if any, is being reviewed and gates submissions.
pub struct ConfirmationController {
    api: Arc<dyn ChatApi>,
    editor: Mutex<Option<EditBuffer>>,
    in_flight: AtomicBool,
}

impl ConfirmationController {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            editor: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Open an edit buffer seeded from the action's serialized transaction.
    ///
    /// The buffer is keyed to one action id. Opening the editor for a second
    /// action while the first is still open is refused and leaves the first
    /// buffer untouched; reopening the same action keeps the existing draft.
    /// Returns the buffer text.
    pub async fn open_editor(&self, action: &ChatAction) -> Result<String, ChatError> {
        if !action.state.is_reviewing() {
            return Err(ChatError::NotReviewing {
                id: action.id.clone(),
            });
        }
        let task = action.task.as_ref().ok_or_else(|| ChatError::NotReviewing {
            id: action.id.clone(),
        })?;

        let mut editor = self.editor.lock().await;
        if let Some(ref buffer) = *editor {
            if buffer.action_id == action.id {
                return Ok(buffer.text.clone());
            }
            return Err(ChatError::EditorOpen {
                id: buffer.action_id.clone(),
            });
        }

        let text = serde_json::to_string_pretty(&task.tx)
            .map_err(|e| ChatError::InvalidPayload(e.to_string()))?;
        *editor = Some(EditBuffer {
            action_id: action.id.clone(),
            text: text.clone(),
        });
        Ok(text)
    }

    /// Replace the open buffer's text.
    pub async fn set_edit_text(&self, text: impl Into<String>) -> Result<(), ChatError> {
        let mut editor = self.editor.lock().await;
        match editor.as_mut() {
            Some(buffer) => {
                buffer.text = text.into();
                Ok(())
            }
            None => Err(ChatError::NoEditor),
        }
    }

    pub async fn edit_buffer(&self) -> Option<EditBuffer> {
        self.editor.lock().await.clone()
    }

    pub async fn close_editor(&self) {
        *self.editor.lock().await = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit a confirm or reject decision for an action.
    ///
    /// On confirm, the edit buffer (when open for this action, and valid
    /// JSON) is the payload; otherwise the action's original transaction is
    /// sent unchanged. On reject the payload is `null`. A parse failure
    /// aborts before the wire and leaves everything as it was.
    pub async fn submit(
        &self,
        action: &ChatAction,
        confirm: bool,
    ) -> Result<ConfirmActionResponse, SubmitError> {
        if !action.state.is_reviewing() {
            return Err(ChatError::NotReviewing {
                id: action.id.clone(),
            }
            .into());
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ChatError::ConfirmationInFlight.into());
        }

        let payload = match self.resolve_payload(action, confirm).await {
            Ok(payload) => payload,
            Err(e) => {
                self.in_flight.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let result = self
            .api
            .confirm_action(ConfirmActionRequest {
                action_id: action.id.clone(),
                tx_data: payload,
                confirm,
            })
            .await;
        self.in_flight.store(false, Ordering::Release);

        match result {
            Ok(response) => {
                self.close_editor().await;
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(action_id = %action.id, "confirmation submission failed: {e}");
                Err(e.into())
            }
        }
    }

    async fn resolve_payload(
        &self,
        action: &ChatAction,
        confirm: bool,
    ) -> Result<serde_json::Value, ChatError> {
        if !confirm {
            return Ok(serde_json::Value::Null);
        }

        let editor = self.editor.lock().await;
        if let Some(buffer) = editor.as_ref().filter(|b| b.action_id == action.id) {
            return serde_json::from_str(&buffer.text)
                .map_err(|e| ChatError::InvalidPayload(e.to_string()));
        }

        let task = action.task.as_ref().ok_or_else(|| ChatError::NotReviewing {
            id: action.id.clone(),
        })?;
        serde_json::to_value(&task.tx).map_err(|e| ChatError::InvalidPayload(e.to_string()))
    }
}
