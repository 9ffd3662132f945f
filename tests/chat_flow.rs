//! End-to-end test of the chat flow against a mock backend.
//!
//! Starts a real Axum server on a random port and drives the full loop with
//! the production client: send a message with no session, adopt the assigned
//! chat id, poll until the proposed action reaches review, edit the payload,
//! confirm, and observe the processed receipt on the next fetch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::timeout;

use agentline::api::{ApiClient, ChatApi};
use agentline::chat::ChatController;
use agentline::chat::binder::{MemorySessionRef, SessionBinder};
use agentline::chat::dispatch::DispatchOutcome;
use agentline::config::{ApiConfig, ChatConfig};

const CHAT_ID: &str = "chat_e2e";
const ACTION_ID: &str = "act_e2e";
const TIMEOUT: Duration = Duration::from_secs(5);

/// Action lifecycle codes the mock walks through.
const GENERATING: u8 = 1;
const REVIEWING: u8 = 3;
const PROCESSED: u8 = 5;

struct Backend {
    /// Whether a message was sent yet (the action exists after that).
    messages: Mutex<Vec<Value>>,
    action_state: AtomicU8,
    confirm_bodies: Mutex<Vec<Value>>,
}

impl Backend {
    fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            action_state: AtomicU8::new(0),
            confirm_bodies: Mutex::new(Vec::new()),
        }
    }
}

fn action_json(state: u8) -> Value {
    let mut action = json!({
        "id": ACTION_ID,
        "chatId": CHAT_ID,
        "agentId": "ag_1",
        "skill": "transfer",
        "workflowIndex": 0,
        "state": state,
        "task": {
            "tx": {
                "address": "0xContract",
                "contractName": "Token",
                "methodSignature": "transfer(address,uint256)",
                "arguments": ["0xabc", "1"]
            },
            "isCall": false,
            "isReady": true,
            "response": "I will transfer 1 token to 0xabc."
        },
        "createdAt": "2024-11-02T10:00:05Z",
        "updatedAt": "2024-11-02T10:00:05Z"
    });
    if state == PROCESSED {
        action["result"] = json!({
            "transactionHash": "0xfeedface",
            "blockNumber": 4242,
            "status": "success"
        });
    }
    action
}

async fn history_handler(
    State(backend): State<Arc<Backend>>,
    Path(chat_id): Path<String>,
) -> Json<Value> {
    assert_eq!(chat_id, CHAT_ID);
    let messages = backend.messages.lock().await.clone();
    let state = backend.action_state.load(Ordering::SeqCst);

    let actions: Vec<Value> = if state == 0 {
        vec![]
    } else {
        vec![action_json(state)]
    };

    // The first observation after a send shows generation in progress;
    // review opens on the following tick.
    if state == GENERATING {
        backend.action_state.store(REVIEWING, Ordering::SeqCst);
    }

    Json(json!({
        "chatId": CHAT_ID,
        "agents": [
            {"agentId": "ag_1", "state": 1, "stateDescription": "Preparing a transfer"}
        ],
        "actions": actions,
        "messages": messages,
    }))
}

async fn send_handler(
    State(backend): State<Arc<Backend>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert_eq!(body["chatId"], "");
    assert_eq!(body["chainId"], 8453);

    backend.messages.lock().await.push(json!({
        "id": "msg_srv_1",
        "chatId": CHAT_ID,
        "agentId": null,
        "content": body["message"],
        "createdAt": "2024-11-02T10:00:00Z",
        "updatedAt": "2024-11-02T10:00:00Z"
    }));
    backend.action_state.store(GENERATING, Ordering::SeqCst);

    Json(json!({
        "chatId": CHAT_ID,
        "agentIds": ["ag_1"],
        "messages": []
    }))
}

async fn confirm_handler(
    State(backend): State<Arc<Backend>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.confirm_bodies.lock().await.push(body);
    backend.action_state.store(PROCESSED, Ordering::SeqCst);
    Json(json!({"txHash": "0xfeedface"}))
}

async fn agent_list_handler() -> Json<Value> {
    Json(json!({
        "agents": [
            {"id": "ag_1", "name": "Vault Keeper", "description": "", "skills": [], "state": 1}
        ]
    }))
}

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("permission denied")
}

/// Start the mock backend on a random port.
async fn start_mock_backend() -> Option<(SocketAddr, Arc<Backend>)> {
    let backend = Arc::new(Backend::new());
    let app = Router::new()
        .route("/chat/{chat_id}", get(history_handler))
        .route("/chat/send", post(send_handler))
        .route("/chat/action/confirm", post(confirm_handler))
        .route("/contract/agent/list", get(agent_list_handler))
        .with_state(backend.clone());

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("failed to bind mock backend: {e:?}"),
    };
    let addr = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some((addr, backend))
}

fn client_for(addr: SocketAddr) -> Arc<dyn ChatApi> {
    let client = ApiClient::new(&ApiConfig {
        base_url: format!("http://{addr}"),
        timeout_ms: 2_000,
    })
    .with_token(SecretString::from("test-token-12345"));
    Arc::new(client)
}

fn fast_chat_config() -> ChatConfig {
    ChatConfig {
        poll_interval_ms: 50,
        default_chain_id: 8453,
    }
}

/// Poll a condition until it holds or the timeout lapses.
async fn wait_for<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(TIMEOUT, async {
        loop {
            if probe().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn send_review_edit_confirm_flow() {
    let Some((addr, backend)) = start_mock_backend().await else {
        return;
    };
    let api = client_for(addr);

    let binder = SessionBinder::new(Box::new(MemorySessionRef::new()));
    let (controller, _notices) = ChatController::new(api, &fast_chat_config(), binder);
    let controller = Arc::new(controller);
    controller.open(None).await;

    // Send with no session: the backend assigns one and the client adopts it
    let outcome = controller.send("transfer 1 token to 0xabc").await;
    assert_eq!(
        outcome,
        DispatchOutcome::Sent {
            adopted_chat_id: Some(CHAT_ID.to_string())
        }
    );
    assert_eq!(controller.chat_id().await.as_deref(), Some(CHAT_ID));

    // Polling first observes generation, then the opened review
    let probe = controller.clone();
    wait_for(move || {
        let controller = probe.clone();
        async move { !controller.reviewing_actions().await.is_empty() }
    })
    .await;

    // Re-fetching unchanged state twice yields an identical timeline
    backend.action_state.store(REVIEWING, Ordering::SeqCst);
    controller.refresh_now().await;
    let first = controller.timeline().await;
    controller.refresh_now().await;
    let second = controller.timeline().await;
    assert_eq!(first, second);
    assert!(
        first
            .windows(2)
            .all(|pair| pair[0].created_at() <= pair[1].created_at())
    );

    // Edit the amount from 1 to 2 and confirm
    let seeded = controller.open_editor(ACTION_ID).await.expect("editor opens");
    assert!(seeded.contains("transfer(address,uint256)"));
    let edited = seeded.replace("\"1\"", "\"2\"");
    controller.set_edit_text(edited).await.expect("buffer open");

    let response = controller.decide(ACTION_ID, true).await.expect("confirms");
    assert_eq!(response.tx_hash.as_deref(), Some("0xfeedface"));

    // The endpoint received the edited payload, not the original
    let bodies = backend.confirm_bodies.lock().await.clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["actionId"], ACTION_ID);
    assert_eq!(bodies[0]["confirm"], true);
    assert_eq!(bodies[0]["txData"]["arguments"], json!(["0xabc", "2"]));

    // decide() refreshed out of band: the processed receipt is visible
    let action = controller.action(ACTION_ID).await.expect("action present");
    assert!(action.state.is_terminal());
    match action.outcome() {
        Some(agentline::api::types::ActionOutcome::Receipt(receipt)) => {
            assert_eq!(receipt.transaction_hash, "0xfeedface");
            assert_eq!(receipt.block_number, Some(4242));
        }
        other => panic!("expected receipt, got {other:?}"),
    }

    controller.close().await;
}

#[tokio::test]
async fn directory_resolves_agent_names() {
    let Some((addr, _backend)) = start_mock_backend().await else {
        return;
    };
    let api = client_for(addr);

    let directory = agentline::agents::AgentDirectory::load(&api).await;
    assert_eq!(directory.display_name("ag_1"), "Vault Keeper");
    assert_eq!(directory.display_name("ag_unknown"), "AI Agent");
}
