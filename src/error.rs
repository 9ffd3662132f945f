//! Error types for agentline.

use serde::Serialize;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the backend REST API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned HTTP {status} for {endpoint}: {message}")]
    Status {
        endpoint: &'static str,
        status: u16,
        message: String,
    },

    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse {
        endpoint: &'static str,
        message: String,
    },

    #[error("not authenticated; run `agentline login` first")]
    NotAuthenticated,
}

impl ApiError {
    /// Whether this failure is transient backend unavailability.
    ///
    /// Transient failures are retried silently by the transcript poller;
    /// everything else is additionally surfaced to the user.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 502 | 503 | 504),
            Self::Request { source, .. } => source.is_timeout() || source.is_connect(),
            Self::InvalidResponse { .. } | Self::NotAuthenticated => false,
        }
    }
}

/// Authentication and session-store errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("login challenge request failed for {address}: {reason}")]
    ChallengeFailed { address: String, reason: String },

    #[error("login rejected by backend: {reason}")]
    LoginRejected { reason: String },

    #[error("invalid wallet address '{0}': expected a 0x-prefixed 40-hex address")]
    InvalidAddress(String),

    #[error("no stored session; run `agentline login` first")]
    NoSession,

    #[error("failed to read session file: {0}")]
    SessionRead(String),

    #[error("failed to write session file: {0}")]
    SessionWrite(String),
}

/// Errors from the conversation state machine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("no action with id {0} in the current transcript")]
    UnknownAction(String),

    #[error("action {id} is not awaiting review")]
    NotReviewing { id: String },

    #[error("an edit buffer is already open for action {id}")]
    EditorOpen { id: String },

    #[error("no edit buffer is open")]
    NoEditor,

    #[error("a confirmation is already in flight")]
    ConfirmationInFlight,

    #[error("edited transaction payload is not valid JSON: {0}")]
    InvalidPayload(String),

    #[error("no active chat session")]
    NoSession,
}

/// JSON-RPC errors (balance queries).
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("no RPC endpoint configured; set AGENTLINE_RPC_URL")]
    NotConfigured,

    #[error("RPC request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("RPC node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("invalid quantity '{0}' in RPC response")]
    InvalidQuantity(String),
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A user-facing notification, decoupled from tracing output.
///
/// The chat components push these over a channel; whichever front end is
/// active decides how to render them. No notice is fatal to the session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;
