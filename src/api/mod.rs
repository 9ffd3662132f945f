//! Typed HTTP client for the agent backend.
//!
//! One wrapper per endpoint, all going through the same status-mapping and
//! decoding path. Everything except the login pair sends the bearer token.

pub mod types;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::config::ApiConfig;
use crate::error::ApiError;
use types::{
    AgentDetail, AgentListResponse, ChatHistoryResponse, ConfirmActionRequest,
    ConfirmActionResponse, CreateAgentRequest, DeleteAgentRequest, EditAgentRequest, LoginMessageResponse,
    LoginRequest, LoginResponse, SendMessageRequest, SendMessageResponse,
};

/// Max characters of an error body carried into an [`ApiError::Status`].
const ERROR_BODY_MAX: usize = 300;

/// Client for the agent backend REST API.
pub struct ApiClient {
    base_url: String,
    client: Client,
    token: Option<SecretString>,
}

impl ApiClient {
    /// Build an unauthenticated client (enough for the login endpoints).
    pub fn new(config: &ApiConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: config.base_url.clone(),
            client,
            token: None,
        }
    }

    /// Attach the bearer token used for authenticated endpoints.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&SecretString, ApiError> {
        self.token.as_ref().ok_or(ApiError::NotAuthenticated)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.len() > ERROR_BODY_MAX {
                format!("{}…", &body[..ERROR_BODY_MAX])
            } else {
                body
            };
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Request { endpoint, source: e })?;
        // Some mutation endpoints answer with an empty body
        let body = if body.trim().is_empty() { "null" } else { &body };
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse {
            endpoint,
            message: e.to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ApiError> {
        let mut request = self.client.get(self.url(path)).query(query);
        if authenticated {
            let token = self.bearer()?;
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request { endpoint, source: e })?;
        Self::decode(endpoint, response).await
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<T, ApiError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if authenticated {
            let token = self.bearer()?;
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request { endpoint, source: e })?;
        Self::decode(endpoint, response).await
    }

    // --- Login ---

    /// Fetch the signable login challenge for a wallet address.
    pub async fn login_message(&self, address: &str) -> Result<LoginMessageResponse, ApiError> {
        self.get(
            "/user/login/message",
            "/user/login/message",
            &[("address", address)],
            false,
        )
        .await
    }

    /// Exchange a signed challenge for a bearer token and agent record.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.post("/user/login", "/user/login", request, false).await
    }

    // --- Agents ---

    pub async fn agent_list(&self) -> Result<AgentListResponse, ApiError> {
        self.get(
            "/contract/agent/list",
            "/contract/agent/list",
            &[],
            true,
        )
        .await
    }

    pub async fn agent_detail(&self, id: &str) -> Result<AgentDetail, ApiError> {
        self.get(
            "/contract/agent/:id",
            &format!("/contract/agent/{id}"),
            &[],
            true,
        )
        .await
    }

    pub async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentDetail, ApiError> {
        self.post(
            "/contract/agent/create",
            "/contract/agent/create",
            request,
            true,
        )
        .await
    }

    pub async fn edit_agent(&self, request: &EditAgentRequest) -> Result<AgentDetail, ApiError> {
        self.post(
            "/contract/agent/edit",
            "/contract/agent/edit",
            request,
            true,
        )
        .await
    }

    pub async fn delete_agent(&self, request: &DeleteAgentRequest) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post(
                "/contract/agent/delete",
                "/contract/agent/delete",
                request,
                true,
            )
            .await?;
        Ok(())
    }

    // --- Chat ---

    pub async fn chat_history(&self, chat_id: &str) -> Result<ChatHistoryResponse, ApiError> {
        self.get(
            "/chat/:chatId",
            &format!("/chat/{chat_id}"),
            &[],
            true,
        )
        .await
    }

    pub async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        self.post("/chat/send", "/chat/send", request, true).await
    }

    pub async fn confirm_action(
        &self,
        request: &ConfirmActionRequest,
    ) -> Result<ConfirmActionResponse, ApiError> {
        self.post(
            "/chat/action/confirm",
            "/chat/action/confirm",
            request,
            true,
        )
        .await
    }
}

/// The backend surface the conversation state machine depends on.
///
/// The trait seam keeps the poller, dispatcher, and confirmation controller
/// testable against an in-memory backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chat_history(&self, chat_id: &str) -> Result<ChatHistoryResponse, ApiError>;

    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError>;

    async fn confirm_action(
        &self,
        request: ConfirmActionRequest,
    ) -> Result<ConfirmActionResponse, ApiError>;

    async fn agent_list(&self) -> Result<AgentListResponse, ApiError>;
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn chat_history(&self, chat_id: &str) -> Result<ChatHistoryResponse, ApiError> {
        ApiClient::chat_history(self, chat_id).await
    }

    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        ApiClient::send_message(self, &request).await
    }

    async fn confirm_action(
        &self,
        request: ConfirmActionRequest,
    ) -> Result<ConfirmActionResponse, ApiError> {
        ApiClient::confirm_action(self, &request).await
    }

    async fn agent_list(&self) -> Result<AgentListResponse, ApiError> {
        ApiClient::agent_list(self).await
    }
}
