//! Session token persistence and login helpers.
//!
//! The bearer token returned by `/user/login` is stored in
//! `~/.agentline/session.json` together with the agent wallet address the
//! backend provisioned for the user. `AGENTLINE_TOKEN` overrides the stored
//! token without touching the file.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Session data persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    #[serde(default)]
    pub agent_address: Option<String>,
    #[serde(default)]
    pub owner_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Get the default session file path (`~/.agentline/session.json`).
pub fn default_session_path() -> PathBuf {
    crate::bootstrap::agentline_dir().join("session.json")
}

/// File-backed store for the login session.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_path() -> Self {
        Self::new(default_session_path())
    }

    /// Load the stored session, if any.
    pub fn load(&self) -> Result<StoredSession, AuthError> {
        if !self.path.exists() {
            return Err(AuthError::NoSession);
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| AuthError::SessionRead(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| AuthError::SessionRead(format!("{}: {}", self.path.display(), e)))
    }

    /// Persist a session, creating the parent directory as needed.
    pub fn save(&self, session: &StoredSession) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::SessionWrite(format!("{}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| AuthError::SessionWrite(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| AuthError::SessionWrite(format!("{}: {}", self.path.display(), e)))?;

        // Restrictive permissions: the file contains a bearer token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)
                .map_err(|e| AuthError::SessionWrite(format!("{}: {}", self.path.display(), e)))?;
        }

        tracing::debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored session. Missing file is not an error.
    pub fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::SessionWrite(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Resolve the bearer token: `AGENTLINE_TOKEN` wins over the session file.
pub fn resolve_token(store: &SessionStore) -> Result<SecretString, AuthError> {
    if let Ok(token) = std::env::var("AGENTLINE_TOKEN") {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(SecretString::from(token.to_string()));
        }
    }
    let session = store.load()?;
    Ok(SecretString::from(session.token))
}

/// Validate a 0x-prefixed 40-hex wallet/contract address.
pub fn validate_address(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim();
    let re = regex::Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address pattern");
    if re.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(AuthError::InvalidAddress(trimmed.to_string()))
    }
}

/// Pull the agent wallet address out of the login token's JWT payload.
///
/// The backend embeds the provisioned agent record in the token
/// (`{"agent": {"agentAddress": "0x…"}}`). Best-effort: any token that isn't
/// a decodable JWT yields `None` and the caller falls back to the login
/// response body.
pub fn agent_address_from_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    value
        .get("agent")
        .and_then(|agent| agent.get("agentAddress"))
        .and_then(|addr| addr.as_str())
        .map(String::from)
}
