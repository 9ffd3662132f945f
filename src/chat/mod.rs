//! The conversation engine.
//!
//! Five cooperating parts, each owning one concern:
//! - [`poller`] keeps local state consistent with the backend on a cadence;
//! - [`timeline`] derives the render order from the two collections;
//! - [`confirm`] gates editing and confirm/reject submissions;
//! - [`dispatch`] sends messages optimistically and coordinates the poller;
//! - [`binder`] keeps the external session reference in sync.
//!
//! [`ChatController`] owns the shared state and is the only surface a front
//! end talks to. Everything runs on one tokio runtime; ordering discipline
//! comes from the suspension gate and the single-flight confirmation gate,
//! not from locks held across suspension points.

pub mod binder;
pub mod confirm;
pub mod dispatch;
pub mod poller;
pub mod state;
pub mod timeline;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};

use crate::api::ChatApi;
use crate::api::types::{ChatAction, ConfirmActionResponse};
use crate::config::ChatConfig;
use crate::error::{ChatError, Error, Notice};

use binder::SessionBinder;
use confirm::{ConfirmationController, EditBuffer, SubmitError};
use dispatch::{DispatchOutcome, MessageDispatcher};
use poller::{PollGate, PollerHandle, fetch_and_apply, spawn_poller};
use state::SharedConversation;
use timeline::TimelineItem;

impl From<SubmitError> for Error {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Chat(e) => Error::Chat(e),
            SubmitError::Api(e) => Error::Api(e),
        }
    }
}

/// Owner of one conversation's state and lifecycle.
pub struct ChatController {
    api: Arc<dyn ChatApi>,
    conversation: SharedConversation,
    gate: Arc<PollGate>,
    confirm: ConfirmationController,
    dispatcher: MessageDispatcher,
    binder: SessionBinder,
    notices: mpsc::UnboundedSender<Notice>,
    poll_interval: Duration,
    poller: Mutex<Option<PollerHandle>>,
}

impl ChatController {
    /// Build a controller. The returned receiver carries user-facing
    /// notices from the poller and dispatcher.
    pub fn new(
        api: Arc<dyn ChatApi>,
        config: &ChatConfig,
        binder: SessionBinder,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(PollGate::new());
        let controller = Self {
            conversation: SharedConversation::new(None),
            gate: gate.clone(),
            confirm: ConfirmationController::new(api.clone()),
            dispatcher: MessageDispatcher::new(api.clone(), gate, config.default_chain_id),
            binder,
            notices,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poller: Mutex::new(None),
            api,
        };
        (controller, notice_rx)
    }

    /// Open a session (or none). Cancels any running poller, resets local
    /// state, and, for a concrete session, records the reference and
    /// starts polling, which fetches immediately.
    pub async fn open(&self, chat_id: Option<String>) {
        self.stop_poller().await;
        self.conversation
            .mutate(|state| state.switch_session(chat_id.clone()))
            .await;
        if let Some(id) = chat_id {
            self.binder.adopt(&id);
            self.start_poller(id).await;
        }
    }

    /// Open whatever session the external reference points at, if any.
    pub async fn open_from_ref(&self) {
        let initial = self.binder.initial();
        self.open(initial).await;
    }

    /// Adopt an externally changed session reference (e.g. the user pasted
    /// a link to a different conversation elsewhere). No-op when in sync.
    pub async fn sync_external(&self) {
        let current = self.conversation.chat_id().await;
        if let Some(new_id) = self.binder.external_change(current.as_deref()) {
            self.open(Some(new_id)).await;
        }
    }

    /// Send a user message. On first-send adoption the session reference is
    /// updated and polling starts for the assigned id.
    pub async fn send(&self, text: &str) -> DispatchOutcome {
        let outcome = self
            .dispatcher
            .dispatch(&self.conversation, &self.notices, text)
            .await;
        if let DispatchOutcome::Sent {
            adopted_chat_id: Some(ref id),
        } = outcome
        {
            self.binder.adopt(id);
            self.start_poller(id.clone()).await;
        }
        outcome
    }

    /// Submit a confirm/reject decision for an action, then re-fetch the
    /// transcript out of band so the UI reflects the new state without
    /// waiting for the next scheduled tick.
    pub async fn decide(
        &self,
        action_id: &str,
        confirm: bool,
    ) -> Result<ConfirmActionResponse, Error> {
        let action = self
            .action(action_id)
            .await
            .ok_or_else(|| ChatError::UnknownAction(action_id.to_string()))?;

        let response = self.confirm.submit(&action, confirm).await?;
        self.refresh_now().await;
        Ok(response)
    }

    /// Fetch and apply the transcript immediately, outside the poll cadence.
    pub async fn refresh_now(&self) {
        if let Some(chat_id) = self.conversation.chat_id().await {
            let _ = fetch_and_apply(&*self.api, &chat_id, &self.conversation, &self.notices).await;
        }
    }

    pub async fn chat_id(&self) -> Option<String> {
        self.conversation.chat_id().await
    }

    /// The merged, time-ordered render sequence. Recomputed on every call.
    pub async fn timeline(&self) -> Vec<TimelineItem> {
        self.conversation
            .read(|state| timeline::merge_timeline(&state.messages, &state.actions))
            .await
    }

    /// Per-agent state descriptions, sorted by agent id for stable display.
    pub async fn agent_states(&self) -> Vec<(String, String)> {
        self.conversation
            .read(|state| {
                let mut entries: Vec<(String, String)> = state
                    .agent_states
                    .iter()
                    .map(|(id, desc)| (id.clone(), desc.clone()))
                    .collect();
                entries.sort();
                entries
            })
            .await
    }

    pub async fn action(&self, action_id: &str) -> Option<ChatAction> {
        self.conversation
            .read(|state| state.action(action_id).cloned())
            .await
    }

    /// Actions currently awaiting user review.
    pub async fn reviewing_actions(&self) -> Vec<ChatAction> {
        self.conversation
            .read(|state| state.reviewing_actions().cloned().collect())
            .await
    }

    pub async fn open_editor(&self, action_id: &str) -> Result<String, Error> {
        let action = self
            .action(action_id)
            .await
            .ok_or_else(|| ChatError::UnknownAction(action_id.to_string()))?;
        Ok(self.confirm.open_editor(&action).await?)
    }

    pub async fn set_edit_text(&self, text: impl Into<String>) -> Result<(), Error> {
        Ok(self.confirm.set_edit_text(text).await?)
    }

    pub async fn edit_buffer(&self) -> Option<EditBuffer> {
        self.confirm.edit_buffer().await
    }

    pub async fn close_editor(&self) {
        self.confirm.close_editor().await;
    }

    pub fn is_confirming(&self) -> bool {
        self.confirm.is_in_flight()
    }

    /// Subscribe to state revisions; fires after every mutation batch.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.conversation.subscribe()
    }

    /// Stop polling. Called on teardown; dropping the controller also
    /// cancels the task through the handle's Drop.
    pub async fn close(&self) {
        self.stop_poller().await;
    }

    async fn start_poller(&self, chat_id: String) {
        let handle = spawn_poller(
            self.api.clone(),
            chat_id,
            self.conversation.clone(),
            self.gate.clone(),
            self.notices.clone(),
            self.poll_interval,
        );
        let mut slot = self.poller.lock().await;
        if let Some(old) = slot.replace(handle) {
            old.cancel();
        }
    }

    async fn stop_poller(&self) {
        let mut slot = self.poller.lock().await;
        if let Some(old) = slot.take() {
            old.cancel();
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! In-memory backend used by the chat component tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::api::ChatApi;
    use crate::api::types::{
        ActionState, ActionTask, AgentListResponse, AgentSummary, ChatAction, ChatAgentState,
        ChatHistoryResponse, ChatMessage, ConfirmActionRequest, ConfirmActionResponse,
        SendMessageRequest, SendMessageResponse, TaskTransaction,
    };
    use crate::error::ApiError;

    pub(crate) fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 2, 10, 0, secs).unwrap()
    }

    pub(crate) fn user_message(id: &str, chat_id: &str, content: &str, secs: u32) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            agent_id: None,
            content: content.to_string(),
            created_at: at(secs),
            updated_at: at(secs),
        }
    }

    pub(crate) fn reviewing_action(id: &str, secs: u32) -> ChatAction {
        ChatAction {
            id: id.to_string(),
            chat_id: "chat_1".to_string(),
            agent_id: "ag_1".to_string(),
            skill: "transfer".to_string(),
            workflow_index: 0,
            state: ActionState::Reviewing,
            task: Some(ActionTask {
                tx: TaskTransaction {
                    address: "0xContract".to_string(),
                    contract_name: "Token".to_string(),
                    method_signature: "transfer(address,uint256)".to_string(),
                    arguments: vec![
                        serde_json::json!("0xabc"),
                        serde_json::json!("1"),
                    ],
                },
                is_call: false,
                is_ready: true,
                response: "I will transfer 1 token to 0xabc.".to_string(),
            }),
            result: None,
            created_at: at(secs),
            updated_at: at(secs),
        }
    }

    pub(crate) fn history(
        chat_id: &str,
        messages: Vec<ChatMessage>,
        actions: Vec<ChatAction>,
    ) -> ChatHistoryResponse {
        ChatHistoryResponse {
            chat_id: chat_id.to_string(),
            agents: vec![ChatAgentState {
                agent_id: "ag_1".to_string(),
                state: 1,
                state_description: "Watching the chain".to_string(),
            }],
            actions,
            messages,
        }
    }

    pub(crate) struct MockApi {
        history: Mutex<ChatHistoryResponse>,
        history_calls: AtomicUsize,
        fail_history_status: Mutex<Option<u16>>,
        send_calls: Mutex<Vec<SendMessageRequest>>,
        confirm_calls: Mutex<Vec<ConfirmActionRequest>>,
        assigned_chat_id: Mutex<String>,
        fail_send: AtomicBool,
        fail_confirm: AtomicBool,
        send_delay: Mutex<Duration>,
        confirm_delay: Mutex<Duration>,
        agents: Mutex<Vec<AgentSummary>>,
    }

    impl MockApi {
        pub(crate) fn new(history: ChatHistoryResponse) -> Self {
            let assigned = history.chat_id.clone();
            Self {
                history: Mutex::new(history),
                history_calls: AtomicUsize::new(0),
                fail_history_status: Mutex::new(None),
                send_calls: Mutex::new(Vec::new()),
                confirm_calls: Mutex::new(Vec::new()),
                assigned_chat_id: Mutex::new(assigned),
                fail_send: AtomicBool::new(false),
                fail_confirm: AtomicBool::new(false),
                send_delay: Mutex::new(Duration::ZERO),
                confirm_delay: Mutex::new(Duration::ZERO),
                agents: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn set_history(&self, history: ChatHistoryResponse) {
            *self.history.lock().expect("mock lock") = history;
        }

        pub(crate) fn history_calls(&self) -> usize {
            self.history_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn fail_history_with(&self, status: u16) {
            *self.fail_history_status.lock().expect("mock lock") = Some(status);
        }

        pub(crate) fn send_calls(&self) -> Vec<SendMessageRequest> {
            self.send_calls.lock().expect("mock lock").clone()
        }

        pub(crate) fn confirm_calls(&self) -> Vec<ConfirmActionRequest> {
            self.confirm_calls.lock().expect("mock lock").clone()
        }

        pub(crate) fn set_assigned_chat_id(&self, chat_id: &str) {
            *self.assigned_chat_id.lock().expect("mock lock") = chat_id.to_string();
        }

        pub(crate) fn fail_send(&self, fail: bool) {
            self.fail_send.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn fail_confirm(&self, fail: bool) {
            self.fail_confirm.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn set_send_delay(&self, delay: Duration) {
            *self.send_delay.lock().expect("mock lock") = delay;
        }

        pub(crate) fn set_confirm_delay(&self, delay: Duration) {
            *self.confirm_delay.lock().expect("mock lock") = delay;
        }
    }

    #[async_trait]
    impl ChatApi for MockApi {
        async fn chat_history(&self, _chat_id: &str) -> Result<ChatHistoryResponse, ApiError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = *self.fail_history_status.lock().expect("mock lock") {
                return Err(ApiError::Status {
                    endpoint: "/chat/:chatId",
                    status,
                    message: "mock failure".to_string(),
                });
            }
            Ok(self.history.lock().expect("mock lock").clone())
        }

        async fn send_message(
            &self,
            request: SendMessageRequest,
        ) -> Result<SendMessageResponse, ApiError> {
            let delay = *self.send_delay.lock().expect("mock lock");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.send_calls.lock().expect("mock lock").push(request);
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    endpoint: "/chat/send",
                    status: 500,
                    message: "mock failure".to_string(),
                });
            }
            Ok(SendMessageResponse {
                chat_id: self.assigned_chat_id.lock().expect("mock lock").clone(),
                agent_ids: vec!["ag_1".to_string()],
                messages: vec![],
            })
        }

        async fn confirm_action(
            &self,
            request: ConfirmActionRequest,
        ) -> Result<ConfirmActionResponse, ApiError> {
            let delay = *self.confirm_delay.lock().expect("mock lock");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.confirm_calls.lock().expect("mock lock").push(request);
            if self.fail_confirm.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    endpoint: "/chat/action/confirm",
                    status: 500,
                    message: "mock failure".to_string(),
                });
            }
            Ok(ConfirmActionResponse {
                tx_hash: Some("0xhash".to_string()),
            })
        }

        async fn agent_list(&self) -> Result<AgentListResponse, ApiError> {
            Ok(AgentListResponse {
                agents: self.agents.lock().expect("mock lock").clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::binder::MemorySessionRef;
    use crate::chat::testutil::{MockApi, history, reviewing_action, user_message};

    fn fast_config() -> ChatConfig {
        ChatConfig {
            poll_interval_ms: 20,
            default_chain_id: 8453,
        }
    }

    fn controller_with(
        api: Arc<MockApi>,
        external: Box<dyn binder::SessionRef>,
    ) -> (ChatController, mpsc::UnboundedReceiver<Notice>) {
        ChatController::new(api, &fast_config(), SessionBinder::new(external))
    }

    #[tokio::test]
    async fn first_send_round_trips_session_identity() {
        let api = Arc::new(MockApi::new(history("chat_77", vec![], vec![])));
        api.set_assigned_chat_id("chat_77");
        let external = Box::new(MemorySessionRef::new());
        let (controller, _notices) = controller_with(api.clone(), external);

        controller.open(None).await;
        let outcome = controller.send("hello").await;

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                adopted_chat_id: Some("chat_77".to_string())
            }
        );
        assert_eq!(controller.chat_id().await.as_deref(), Some("chat_77"));
        // the external reference reflects the adopted session
        assert_eq!(controller.binder.initial().as_deref(), Some("chat_77"));

        // polling for the adopted session begins immediately
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(api.history_calls() >= 1);

        controller.close().await;
    }

    #[tokio::test]
    async fn external_change_is_adopted_and_fetched() {
        let api = Arc::new(MockApi::new(history(
            "chat_b",
            vec![user_message("msg_b", "chat_b", "from b", 0)],
            vec![],
        )));
        let external = MemorySessionRef::new();
        {
            use crate::chat::binder::SessionRef;
            external.store("chat_a");
        }
        let (controller, _notices) = controller_with(api.clone(), Box::new(external));

        controller.open_from_ref().await;
        assert_eq!(controller.chat_id().await.as_deref(), Some("chat_a"));

        // someone moved the external reference to a different session
        controller.binder.adopt("chat_b");
        controller.sync_external().await;
        assert_eq!(controller.chat_id().await.as_deref(), Some("chat_b"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        let timeline = controller.timeline().await;
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].id(), "msg_b");

        controller.close().await;
    }

    #[tokio::test]
    async fn decide_refreshes_out_of_band() {
        let api = Arc::new(MockApi::new(history(
            "chat_1",
            vec![],
            vec![reviewing_action("act_1", 3)],
        )));
        let (controller, _notices) =
            controller_with(api.clone(), Box::new(MemorySessionRef::new()));

        // no poller running: only decide() itself may fetch
        controller
            .conversation
            .mutate(|state| state.switch_session(Some("chat_1".to_string())))
            .await;
        controller.refresh_now().await;
        let baseline = api.history_calls();

        let response = controller.decide("act_1", true).await.expect("decides");
        assert_eq!(response.tx_hash.as_deref(), Some("0xhash"));
        assert_eq!(api.history_calls(), baseline + 1);

        assert_eq!(api.confirm_calls().len(), 1);
    }

    #[tokio::test]
    async fn decide_unknown_action_is_an_error() {
        let api = Arc::new(MockApi::new(history("chat_1", vec![], vec![])));
        let (controller, _notices) =
            controller_with(api.clone(), Box::new(MemorySessionRef::new()));
        controller
            .conversation
            .mutate(|state| state.switch_session(Some("chat_1".to_string())))
            .await;

        let err = controller.decide("missing", true).await.unwrap_err();
        assert!(matches!(err, Error::Chat(ChatError::UnknownAction(_))));
        assert!(api.confirm_calls().is_empty());
    }

    #[tokio::test]
    async fn switching_sessions_replaces_the_poller() {
        let api = Arc::new(MockApi::new(history("chat_2", vec![], vec![])));
        let (controller, _notices) =
            controller_with(api.clone(), Box::new(MemorySessionRef::new()));

        controller.open(Some("chat_1".to_string())).await;
        controller.open(Some("chat_2".to_string())).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        controller.close().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_close = api.history_calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        // teardown cancelled every poller; no detached timers keep fetching
        assert_eq!(api.history_calls(), after_close);
    }
}
