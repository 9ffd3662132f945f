//! Command handlers for the agentline binary.

use std::io::Write;

use anyhow::Context;
use chrono::{Local, TimeZone};

use crate::api::ApiClient;
use crate::api::types::{
    AgentDetail, Backstory, CreateAgentRequest, DeleteAgentRequest, EditAgentRequest, LoginRequest,
};
use crate::agents::agent_state_label;
use crate::auth::{SessionStore, StoredSession, agent_address_from_token, validate_address};
use crate::config::Config;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[90m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read input")?;
    Ok(line.trim().to_string())
}

fn format_last_active(epoch_ms: Option<i64>) -> String {
    match epoch_ms.and_then(|ms| Local.timestamp_millis_opt(ms).single()) {
        Some(time) => time.format("%b %e %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// `agentline login --address 0x…`
///
/// Wallet cryptography stays outside this client: the challenge is printed,
/// the user signs it with their own wallet tooling, and pastes the signature
/// back.
pub async fn login(config: &Config, store: &SessionStore, address: &str) -> anyhow::Result<()> {
    let address = validate_address(address)?;
    let client = ApiClient::new(&config.api);

    let challenge = client
        .login_message(&address)
        .await
        .context("failed to fetch the login challenge")?;

    println!();
    println!("{BOLD}Sign this message with the wallet {address}:{RESET}");
    println!();
    println!("  {}", challenge.message.replace('\n', "\n  "));
    println!();

    let signature = prompt_line("Paste the signature (0x…): ")?;
    if signature.is_empty() {
        anyhow::bail!("no signature provided");
    }

    let response = client
        .login(&LoginRequest {
            signature,
            message: challenge.message,
            address: address.clone(),
        })
        .await
        .context("login rejected")?;

    // Prefer the JWT payload's agent address, fall back to the response body
    let agent_address = agent_address_from_token(&response.token)
        .or_else(|| {
            (!response.agent.agent_address.is_empty()).then(|| response.agent.agent_address.clone())
        });

    store.save(&StoredSession {
        token: response.token,
        agent_address: agent_address.clone(),
        owner_address: Some(address),
        created_at: chrono::Utc::now(),
    })?;

    println!();
    println!("{GREEN}\u{25CF} Logged in.{RESET}");
    if let Some(agent_address) = agent_address {
        println!("{DIM}agent wallet: {agent_address}{RESET}");
    }
    Ok(())
}

/// `agentline logout`
pub fn logout(store: &SessionStore) -> anyhow::Result<()> {
    store.clear()?;
    println!("{DIM}session cleared{RESET}");
    Ok(())
}

/// `agentline agent list`
pub async fn agent_list(client: &ApiClient) -> anyhow::Result<()> {
    let response = client.agent_list().await?;
    if response.agents.is_empty() {
        println!("{DIM}no agents deployed yet; try `agentline agent create`{RESET}");
        return Ok(());
    }

    println!(
        "{BOLD}{:<26} {:<8} {:<24} {:<14} {:>6}{RESET}",
        "NAME", "STATE", "SKILLS", "LAST ACTIVE", "USERS"
    );
    for agent in &response.agents {
        let skills: Vec<&str> = agent.skills.iter().map(|s| s.name.as_str()).collect();
        let state = agent_state_label(agent.state);
        let state_colored = match state {
            "active" => format!("{GREEN}{state}{RESET}"),
            "error" => format!("{RED}{state}{RESET}"),
            _ => format!("{DIM}{state}{RESET}"),
        };
        println!(
            "{:<26} {:<17} {:<24} {:<14} {:>6}",
            agent.name,
            state_colored,
            skills.join(", "),
            format_last_active(agent.last_action_time),
            agent
                .user_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        println!("{DIM}  {} {}{RESET}", agent.id, agent.description);
    }
    Ok(())
}

fn print_agent_detail(agent: &AgentDetail) {
    println!("{BOLD}{}{RESET}  {}", agent.name, agent.description);
    println!("{DIM}id:{RESET}       {}", agent.id);
    println!("{DIM}contract:{RESET} {}", agent.address);
    println!("{DIM}chain:{RESET}    {}", agent.chain_id);
    println!("{DIM}creator:{RESET}  {}", agent.creator_address);
    println!("{DIM}state:{RESET}    {}", agent_state_label(agent.state));
    if !agent.skills.is_empty() {
        println!();
        println!("{BOLD}Skills{RESET}");
        for skill in &agent.skills {
            println!("  {GREEN}{}{RESET} {DIM}{}{RESET}", skill.name, skill.description);
            for (index, step) in skill.workflow.iter().enumerate() {
                println!("    {DIM}{index}. {step}{RESET}");
            }
        }
    }
    if !agent.backstories.is_empty() {
        println!();
        println!("{BOLD}Backstories{RESET}");
        for story in &agent.backstories {
            println!("  {BOLD}{}{RESET}", story.title);
            println!("  {DIM}{}{RESET}", story.content);
        }
    }
}

/// `agentline agent show <id>`
pub async fn agent_show(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let agent = client.agent_detail(id).await?;
    print_agent_detail(&agent);
    Ok(())
}

/// Parse a `--backstory "Title: content"` argument.
fn parse_backstory(raw: &str) -> anyhow::Result<Backstory> {
    match raw.split_once(':') {
        Some((title, content)) if !title.trim().is_empty() && !content.trim().is_empty() => {
            Ok(Backstory {
                title: title.trim().to_string(),
                content: content.trim().to_string(),
            })
        }
        _ => anyhow::bail!("backstory must look like \"Title: content\", got '{raw}'"),
    }
}

/// `agentline agent create --address 0x… [--backstory "Title: content"]…`
pub async fn agent_create(
    client: &ApiClient,
    chain_id: u64,
    address: &str,
    backstories: &[String],
) -> anyhow::Result<()> {
    let address = validate_address(address)?;
    let backstories = backstories
        .iter()
        .map(|raw| parse_backstory(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let agent = client
        .create_agent(&CreateAgentRequest {
            chain_id,
            address,
            backstories,
        })
        .await
        .context("agent creation failed")?;

    println!("{GREEN}\u{25CF} Agent deployed.{RESET}");
    println!();
    print_agent_detail(&agent);
    println!();
    println!("{DIM}chat with it: agentline chat{RESET}");
    Ok(())
}

/// `agentline agent edit <id> [--name …] [--description …]`
///
/// Unspecified fields keep their current values; the backend expects the
/// full record on edit, so the current detail is fetched first.
pub async fn agent_edit(
    client: &ApiClient,
    id: &str,
    name: Option<String>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let current = client.agent_detail(id).await?;

    let agent = client
        .edit_agent(&EditAgentRequest {
            agent_id: current.id.clone(),
            name: name.unwrap_or_else(|| current.name.clone()),
            description: description.unwrap_or_else(|| current.description.clone()),
            skills: current.skills.clone(),
            backstories: current.backstories.clone(),
        })
        .await
        .context("agent edit failed")?;

    println!("{GREEN}\u{25CF} Agent updated.{RESET}");
    println!();
    print_agent_detail(&agent);
    Ok(())
}

/// `agentline agent delete <id> [--yes]`
pub async fn agent_delete(client: &ApiClient, id: &str, assume_yes: bool) -> anyhow::Result<()> {
    if !assume_yes {
        let answer = prompt_line(&format!("Delete agent {id}? [y/N] "))?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            println!("{DIM}aborted{RESET}");
            return Ok(());
        }
    }

    client
        .delete_agent(&DeleteAgentRequest {
            agent_id: id.to_string(),
        })
        .await
        .context("agent deletion failed")?;
    println!("{GREEN}\u{25CF} Agent deleted.{RESET}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backstory_arguments() {
        let story = parse_backstory("Origin: Forged in the vaults of Base").expect("parses");
        assert_eq!(story.title, "Origin");
        assert_eq!(story.content, "Forged in the vaults of Base");

        assert!(parse_backstory("no separator").is_err());
        assert!(parse_backstory(": empty title").is_err());
        assert!(parse_backstory("Empty content:").is_err());
    }

    #[test]
    fn formats_last_active_fallback() {
        assert_eq!(format_last_active(None), "-");
        assert!(!format_last_active(Some(1_730_540_000_000)).is_empty());
    }
}
