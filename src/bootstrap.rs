//! Bootstrap helpers for agentline.
//!
//! Env vars load before anything else: the standard `./.env` first, then
//! `~/.agentline/.env` (dotenvy never overwrites existing vars, so explicit
//! env vars win over both files). Tracing goes to stderr so it never
//! interleaves with chat output on stdout.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Directory holding per-user agentline state: `~/.agentline`.
pub fn agentline_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentline")
}

/// Path to the agentline-specific `.env` file: `~/.agentline/.env`.
pub fn agentline_env_path() -> PathBuf {
    agentline_dir().join(".env")
}

/// Load env vars from `./.env` and `~/.agentline/.env`.
///
/// Effective priority: explicit env vars > `./.env` > `~/.agentline/.env`.
pub fn load_agentline_env() {
    let _ = dotenvy::dotenv();
    let path = agentline_env_path();
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}

/// Initialize tracing from `RUST_LOG`, defaulting to warn for dependencies
/// and info for this crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,agentline=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
