//! Request and response DTOs for the agent backend API.
//!
//! Wire format is camelCase JSON. Collection fields default to empty so a
//! sparse backend response never fails the whole deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// --- Action lifecycle ---

/// Client-observed projection of an action's lifecycle state.
///
/// The backend owns the state machine; the client only renders states and
/// gates interaction on them. States travel the wire as bare numbers:
/// Pending(0) → Generating(1) → {Paused(2) | Reviewing(3)} →
/// {Confirmed(4) → Processed(5)} | Rejected(6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Generating,
    Paused,
    Reviewing,
    Confirmed,
    Processed,
    Rejected,
    /// A state code this client version doesn't know. Gates stay closed.
    Unknown(u8),
}

impl ActionState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Pending,
            1 => Self::Generating,
            2 => Self::Paused,
            3 => Self::Reviewing,
            4 => Self::Confirmed,
            5 => Self::Processed,
            6 => Self::Rejected,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Generating => 1,
            Self::Paused => 2,
            Self::Reviewing => 3,
            Self::Confirmed => 4,
            Self::Processed => 5,
            Self::Rejected => 6,
            Self::Unknown(code) => code,
        }
    }

    /// The only state in which the user may edit, confirm, or reject.
    pub fn is_reviewing(self) -> bool {
        matches!(self, Self::Reviewing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Rejected)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Paused => write!(f, "paused"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Processed => write!(f, "processed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

impl Serialize for ActionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ActionState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Ok(Self::from_code(code))
    }
}

// --- Chat ---

/// One chat turn. A message with no agent id is always attributed to the
/// human user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_user(&self) -> bool {
        self.agent_id.is_none()
    }
}

/// The transaction an action proposes to execute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTransaction {
    pub address: String,
    #[serde(default)]
    pub contract_name: String,
    pub method_signature: String,
    /// Call arguments: strings, or string arrays for array-typed parameters.
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

/// The payload an agent attaches to an action once generation completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionTask {
    pub tx: TaskTransaction,
    /// Read-only call (`eth_call`) rather than a state-changing send.
    #[serde(default)]
    pub is_call: bool,
    #[serde(default)]
    pub is_ready: bool,
    /// Natural-language text shown in the timeline for this action.
    #[serde(default)]
    pub response: String,
}

/// Receipt returned once a confirmed send lands on chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

/// Execution outcome of a completed action, keyed by the task's `is_call`
/// flag rather than by structural sniffing of the raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Return value of a read-only call.
    CallReturn(serde_json::Value),
    /// Receipt of a state-changing send.
    Receipt(TransactionReceipt),
}

/// One agent-proposed blockchain operation moving through the confirmation
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatAction {
    pub id: String,
    pub chat_id: String,
    pub agent_id: String,
    /// Which capability produced this action.
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub workflow_index: u32,
    pub state: ActionState,
    #[serde(default)]
    pub task: Option<ActionTask>,
    /// Raw execution result; interpret through [`ChatAction::outcome`].
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatAction {
    /// Typed view of the raw `result`, keyed by the sibling task's `is_call`
    /// flag. `None` when there is no result yet, no task to key on, or the
    /// receipt doesn't parse.
    pub fn outcome(&self) -> Option<ActionOutcome> {
        let raw = self.result.as_ref()?;
        let task = self.task.as_ref()?;
        if task.is_call {
            Some(ActionOutcome::CallReturn(raw.clone()))
        } else {
            serde_json::from_value::<TransactionReceipt>(raw.clone())
                .ok()
                .map(ActionOutcome::Receipt)
        }
    }
}

/// Per-agent state snapshot carried with each history fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatAgentState {
    pub agent_id: String,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub state_description: String,
}

/// Full authoritative view of a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub chat_id: String,
    #[serde(default)]
    pub agents: Vec<ChatAgentState>,
    #[serde(default)]
    pub actions: Vec<ChatAction>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    /// Empty string when no session exists yet; the backend assigns one.
    pub chat_id: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub chat_id: String,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmActionRequest {
    pub action_id: String,
    /// The transaction payload to execute; `null` on reject.
    pub tx_data: serde_json::Value,
    pub confirm: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmActionResponse {
    #[serde(default)]
    pub tx_hash: Option<String>,
}

// --- Login ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginMessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub signature: String,
    pub message: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAgent {
    pub id: String,
    #[serde(default)]
    pub agent_address: String,
    #[serde(default)]
    pub owner_address: String,
    #[serde(default)]
    pub state: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub agent: LoginAgent,
}

// --- Agents ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Backstory {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub workflow: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub state: i32,
    /// Epoch milliseconds of the agent's most recent action.
    #[serde(default)]
    pub last_action_time: Option<i64>,
    #[serde(default)]
    pub user_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentListResponse {
    #[serde(default)]
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetail {
    pub id: String,
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub creator_address: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contracts: Vec<String>,
    #[serde(default)]
    pub abis: Vec<serde_json::Value>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub backstories: Vec<Backstory>,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub last_action_time: Option<i64>,
    #[serde(default)]
    pub user_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub chain_id: u64,
    pub address: String,
    pub backstories: Vec<Backstory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAgentRequest {
    pub agent_id: String,
    pub name: String,
    pub description: String,
    pub skills: Vec<Skill>,
    pub backstories: Vec<Backstory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAgentRequest {
    pub agent_id: String,
}
