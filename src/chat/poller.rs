//! Transcript polling.
//!
//! One spawned task per active session keeps the local conversation state
//! consistent with the backend: an immediate fetch on activation, then a
//! re-fetch on a fixed cadence. Each fetch result wholly replaces the local
//! collections. Ticks never overlap: the next tick is only scheduled after
//! the previous fetch settles.
//!
//! The dispatcher suspends the gate for the duration of a send; a suspended
//! gate skips the fetch but keeps the cadence running. Cancellation is
//! immediate for the pending sleep and re-checked after an in-flight fetch,
//! so a cancelled poller never writes to torn-down state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::ChatApi;
use crate::chat::state::SharedConversation;
use crate::error::Notice;

/// Suspension gate shared between the poller and the message dispatcher.
///
/// Single-flight: `try_suspend` is a compare-and-swap, so a second send
/// cannot pass the gate while one is outstanding.
#[derive(Debug, Default)]
pub struct PollGate {
    suspended: AtomicBool,
}

impl PollGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Returns false if it is already held.
    pub fn try_suspend(&self) -> bool {
        self.suspended
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the gate. Safe to call when not held.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}

/// Handle to a running poller. Cancelling (or dropping) the handle stops the
/// pending tick; no further ticks fire.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Fetch the session history once and replace local state with it.
///
/// Failures are logged and polling continues; only non-transient classes
/// are surfaced as a notice. Returns whether the fetch succeeded.
pub(crate) async fn fetch_and_apply(
    api: &dyn ChatApi,
    chat_id: &str,
    conversation: &SharedConversation,
    notices: &mpsc::UnboundedSender<Notice>,
) -> bool {
    match api.chat_history(chat_id).await {
        Ok(history) => {
            conversation
                .mutate(|state| state.apply_snapshot(history))
                .await;
            true
        }
        Err(e) => {
            tracing::warn!(%chat_id, "failed to load chat history: {e}");
            if !e.is_transient() {
                let _ = notices.send(Notice::error(format!("Failed to load chat history: {e}")));
            }
            false
        }
    }
}

/// Spawn the polling task for a session.
pub fn spawn_poller(
    api: Arc<dyn ChatApi>,
    chat_id: String,
    conversation: SharedConversation,
    gate: Arc<PollGate>,
    notices: mpsc::UnboundedSender<Notice>,
    interval: Duration,
) -> PollerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if !gate.is_suspended() {
                let fetched = api.chat_history(&chat_id).await;
                // Cancellation may have landed while the fetch was in
                // flight; the replacement must not touch torn-down state.
                if *shutdown_rx.borrow() {
                    break;
                }
                match fetched {
                    Ok(history) => {
                        conversation
                            .mutate(|state| state.apply_snapshot(history))
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(%chat_id, "failed to load chat history: {e}");
                        if !e.is_transient() {
                            let _ = notices
                                .send(Notice::error(format!("Failed to load chat history: {e}")));
                        }
                    }
                }
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });

    PollerHandle { shutdown, handle }
}
