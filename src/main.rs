use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use agentline::api::ApiClient;
use agentline::agents::AgentDirectory;
use agentline::auth::{SessionStore, resolve_token};
use agentline::bootstrap;
use agentline::channels::ChatRepl;
use agentline::chat::ChatController;
use agentline::chat::binder::{FileSessionRef, SessionBinder};
use agentline::cli;
use agentline::config::Config;
use agentline::rpc::RpcClient;

#[derive(Parser)]
#[command(name = "agentline", version, about = "Chat with contract-bound AI agents")]
struct Cli {
    /// Path to a config file (default: ~/.agentline/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the interactive chat (default)
    Chat {
        /// Session to open instead of the last one
        #[arg(long)]
        chat: Option<String>,
        /// Chain id to send messages with
        #[arg(long)]
        chain_id: Option<u64>,
    },
    /// Obtain a login challenge and store the session token
    Login {
        /// Wallet address to log in as
        #[arg(long)]
        address: String,
    },
    /// Drop the stored session token
    Logout,
    /// Manage contract agents
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// List deployed agents
    List,
    /// Show one agent in full
    Show { id: String },
    /// Deploy an agent bound to a contract
    Create {
        /// Contract address the agent is bound to
        #[arg(long)]
        address: String,
        /// Chain the contract lives on (default from config)
        #[arg(long)]
        chain_id: Option<u64>,
        /// Backstory as "Title: content" (repeatable)
        #[arg(long = "backstory")]
        backstories: Vec<String>,
    },
    /// Edit an agent's name or description
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an agent
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn authenticated_client(config: &Config, store: &SessionStore) -> anyhow::Result<ApiClient> {
    let token = resolve_token(store)?;
    Ok(ApiClient::new(&config.api).with_token(token))
}

async fn run_chat(
    config: &Config,
    store: &SessionStore,
    chat: Option<String>,
    chain_id: Option<u64>,
) -> anyhow::Result<()> {
    let chain_id = chain_id.unwrap_or(config.chat.default_chain_id);
    let mut chat_config = config.chat.clone();
    chat_config.default_chain_id = chain_id;

    let client = authenticated_client(config, store)?;
    let api: Arc<dyn agentline::api::ChatApi> = Arc::new(client);

    let binder = SessionBinder::new(Box::new(FileSessionRef::at_default_path()));
    let (controller, notices) = ChatController::new(api.clone(), &chat_config, binder);
    let controller = Arc::new(controller);

    match chat {
        Some(chat_id) => controller.open(Some(chat_id)).await,
        None => controller.open_from_ref().await,
    }

    let directory = AgentDirectory::load(&api).await;
    let rpc = RpcClient::new(&config.rpc).ok();
    let agent_address = store.load().ok().and_then(|session| session.agent_address);

    ChatRepl::new(controller, directory, rpc, chain_id, agent_address)
        .run(notices)
        .await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::load_agentline_env();
    bootstrap::init_tracing();

    let args = Cli::parse();
    let config = Config::load(args.config.as_deref())?;
    let store = SessionStore::at_default_path();

    match args.command.unwrap_or(Command::Chat {
        chat: None,
        chain_id: None,
    }) {
        Command::Chat { chat, chain_id } => run_chat(&config, &store, chat, chain_id).await?,
        Command::Login { address } => cli::login(&config, &store, &address).await?,
        Command::Logout => cli::logout(&store)?,
        Command::Agent { command } => {
            let client = authenticated_client(&config, &store)?;
            match command {
                AgentCommand::List => cli::agent_list(&client).await?,
                AgentCommand::Show { id } => cli::agent_show(&client, &id).await?,
                AgentCommand::Create {
                    address,
                    chain_id,
                    backstories,
                } => {
                    cli::agent_create(
                        &client,
                        chain_id.unwrap_or(config.chat.default_chain_id),
                        &address,
                        &backstories,
                    )
                    .await?
                }
                AgentCommand::Edit {
                    id,
                    name,
                    description,
                } => cli::agent_edit(&client, &id, name, description).await?,
                AgentCommand::Delete { id, yes } => cli::agent_delete(&client, &id, yes).await?,
            }
        }
    }

    Ok(())
}
