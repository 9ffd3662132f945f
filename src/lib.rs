//! agentline: terminal client for contract-bound AI agents.
//!
//! Users authenticate with a wallet-signed challenge, deploy agents bound to
//! smart contracts, and chat with them. Agents answer with proposed on-chain
//! actions that move through a backend-owned confirmation lifecycle; this
//! client renders the conversation, polls the authoritative transcript, and
//! gates the review/confirm flow.

pub mod agents;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod channels;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod explorer;
pub mod rpc;

pub use error::{Error, Result};
