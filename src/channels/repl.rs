//! Interactive chat REPL with line editing and markdown rendering.
//!
//! The primary interface for talking to contract agents. Uses rustyline for
//! line editing, history, and tab-completion; termimad for rendering agent
//! responses inline.
//!
//! ## Commands
//!
//! - `/help` - Show available commands
//! - `/quit` or `/exit` - Exit the REPL
//! - `/open <chatId>` - Switch to another chat session
//! - `/new` - Start a fresh session (next message creates it)
//! - `/history` - Reprint the full timeline
//! - `/agents` - Show agent states for this session
//! - `/tx [actionId]` - Show the pending transaction payload
//! - `/edit [actionId]` - Open the edit buffer for a pending action
//! - `/set <json>` - Replace the open edit buffer
//! - `/canceledit` - Discard the open edit buffer
//! - `/address`, `/balance` - Agent wallet address and ETH balance
//! - `/explorer <txHash>` - Open a transaction in the block explorer
//! - `yes`/`no` - Confirm or reject the action under review

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use rustyline::completion::Completer;
use rustyline::config::Config as LineConfig;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use termimad::MadSkin;
use tokio::sync::mpsc;

use crate::agents::AgentDirectory;
use crate::api::types::{ActionOutcome, ActionState, ChatAction};
use crate::chat::ChatController;
use crate::chat::dispatch::DispatchOutcome;
use crate::chat::timeline::TimelineItem;
use crate::error::{Notice, NoticeLevel};
use crate::explorer;
use crate::rpc::{RpcClient, format_eth};

/// Slash commands available in the REPL.
const SLASH_COMMANDS: &[&str] = &[
    "/help",
    "/quit",
    "/exit",
    "/open",
    "/new",
    "/history",
    "/agents",
    "/tx",
    "/edit",
    "/set",
    "/canceledit",
    "/address",
    "/balance",
    "/explorer",
];

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

/// Build a termimad skin with our color scheme.
fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(termimad::crossterm::style::Color::Yellow);
    skin.bold.set_fg(termimad::crossterm::style::Color::White);
    skin.inline_code
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block.left_margin = 2;
    skin
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
}

/// Get the history file path (~/.agentline/history).
fn history_path() -> std::path::PathBuf {
    crate::bootstrap::agentline_dir().join("history")
}

fn print_help() {
    let h = "\x1b[1m"; // bold (section headers)
    let c = "\x1b[1;36m"; // bold cyan (commands)
    let d = "\x1b[90m"; // dim gray (descriptions)
    let r = "\x1b[0m"; // reset

    println!();
    println!("  {h}Agentline chat{r}");
    println!();
    println!("  {h}Session{r}");
    println!("  {c}/open <chatId>{r}     {d}switch to another session{r}");
    println!("  {c}/new{r}               {d}fresh session; next message creates it{r}");
    println!("  {c}/history{r}           {d}reprint the full timeline{r}");
    println!("  {c}/agents{r}            {d}agent states for this session{r}");
    println!();
    println!("  {h}Actions{r}");
    println!("  {c}/tx [id]{r}           {d}show the pending transaction payload{r}");
    println!("  {c}/edit [id]{r}         {d}open the edit buffer{r}");
    println!("  {c}/set <json>{r}        {d}replace the edit buffer{r}");
    println!("  {c}/canceledit{r}        {d}discard the edit buffer{r}");
    println!("  {c}yes{r} ({c}y{r})            {d}confirm the action under review{r}");
    println!("  {c}no{r} ({c}n{r})             {d}reject the action under review{r}");
    println!();
    println!("  {h}Wallet{r}");
    println!("  {c}/address{r}           {d}agent wallet address{r}");
    println!("  {c}/balance{r}           {d}agent wallet ETH balance{r}");
    println!("  {c}/explorer <hash>{r}   {d}open a transaction in the explorer{r}");
    println!();
    println!("  {c}/quit{r} {c}/exit{r}        {d}exit{r}");
    println!();
}

fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Info => eprintln!("  \x1b[36m\u{25CB} {}\x1b[0m", notice.message),
        NoticeLevel::Warn => eprintln!("  \x1b[33m\u{26A0} {}\x1b[0m", notice.message),
        NoticeLevel::Error => eprintln!("  \x1b[31m\u{2717} {}\x1b[0m", notice.message),
    }
}

/// Interactive chat front end.
pub struct ChatRepl {
    controller: Arc<ChatController>,
    directory: AgentDirectory,
    rpc: Option<RpcClient>,
    chain_id: u64,
    agent_address: Option<String>,
    skin: MadSkin,
    /// action id → last printed state, for transition detection.
    printed_states: HashMap<String, ActionState>,
}

impl ChatRepl {
    pub fn new(
        controller: Arc<ChatController>,
        directory: AgentDirectory,
        rpc: Option<RpcClient>,
        chain_id: u64,
        agent_address: Option<String>,
    ) -> Self {
        Self {
            controller,
            directory,
            rpc,
            chain_id,
            agent_address,
            skin: make_skin(),
            printed_states: HashMap::new(),
        }
    }

    /// Run the REPL until the user quits.
    pub async fn run(mut self, mut notices: mpsc::UnboundedReceiver<Notice>) {
        let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
        spawn_input_thread(line_tx);

        println!("\x1b[1mAgentline\x1b[0m  /help for commands, /quit to exit");
        if let Some(chat_id) = self.controller.chat_id().await {
            println!("\x1b[90msession {chat_id}\x1b[0m");
        }
        println!();
        self.print_agent_states().await;
        self.print_timeline(true).await;

        let mut updates = self.controller.subscribe_updates();

        loop {
            tokio::select! {
                line = line_rx.recv() => {
                    let Some(line) = line else { break };
                    if !self.handle_line(line.trim()).await {
                        break;
                    }
                }
                notice = notices.recv() => {
                    if let Some(notice) = notice {
                        print_notice(&notice);
                    }
                }
                changed = updates.changed() => {
                    if changed.is_ok() {
                        self.print_new_activity().await;
                    }
                }
            }
        }

        self.controller.close().await;
    }

    /// Handle one input line. Returns false when the REPL should exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }

        match line.to_lowercase().as_str() {
            "/quit" | "/exit" => return false,
            "/help" => {
                print_help();
                return true;
            }
            "/new" => {
                self.controller.open(None).await;
                self.printed_states.clear();
                println!("\x1b[90mnew session; your next message starts it\x1b[0m");
                return true;
            }
            "/history" => {
                self.print_timeline(true).await;
                return true;
            }
            "/agents" => {
                self.print_agent_states().await;
                return true;
            }
            "/canceledit" => {
                self.controller.close_editor().await;
                println!("\x1b[90medit buffer discarded\x1b[0m");
                return true;
            }
            "/address" => {
                self.print_address();
                return true;
            }
            "/balance" => {
                self.print_balance().await;
                return true;
            }
            "yes" | "y" => {
                self.decide(true).await;
                return true;
            }
            "no" | "n" => {
                self.decide(false).await;
                return true;
            }
            _ => {}
        }

        if let Some(chat_id) = line.strip_prefix("/open ") {
            let chat_id = chat_id.trim().to_string();
            if chat_id.is_empty() {
                eprintln!("  \x1b[31musage: /open <chatId>\x1b[0m");
            } else {
                self.controller.open(Some(chat_id.clone())).await;
                self.printed_states.clear();
                println!("\x1b[90mopened session {chat_id}\x1b[0m");
            }
            return true;
        }
        if let Some(rest) = line.strip_prefix("/tx") {
            self.print_pending_tx(rest.trim()).await;
            return true;
        }
        if let Some(rest) = line.strip_prefix("/edit") {
            self.open_editor(rest.trim()).await;
            return true;
        }
        if let Some(json) = line.strip_prefix("/set ") {
            match self.controller.set_edit_text(json.trim()).await {
                Ok(()) => println!("\x1b[90medit buffer updated\x1b[0m"),
                Err(e) => eprintln!("  \x1b[31m{e}\x1b[0m"),
            }
            return true;
        }
        if let Some(hash) = line.strip_prefix("/explorer ") {
            self.open_explorer(hash.trim());
            return true;
        }
        if line.starts_with('/') {
            eprintln!("  \x1b[31munknown command {line}; /help lists commands\x1b[0m");
            return true;
        }

        // Anything else is a chat message.
        match self.controller.send(line).await {
            DispatchOutcome::Sent {
                adopted_chat_id: Some(chat_id),
            } => {
                println!("\x1b[90msession {chat_id}\x1b[0m");
            }
            // Ignored covers the in-flight gate and is deliberately silent;
            // Failed already surfaced a notice.
            DispatchOutcome::Sent { .. } | DispatchOutcome::Ignored | DispatchOutcome::Failed => {}
        }
        true
    }

    /// The action a bare `yes`/`no` refers to: the one with the open edit
    /// buffer, else the first action under review.
    async fn current_review(&self) -> Option<ChatAction> {
        if let Some(buffer) = self.controller.edit_buffer().await {
            if let Some(action) = self.controller.action(&buffer.action_id).await {
                return Some(action);
            }
        }
        self.controller.reviewing_actions().await.into_iter().next()
    }

    async fn decide(&mut self, confirm: bool) {
        let Some(action) = self.current_review().await else {
            eprintln!("  \x1b[90mno action is awaiting review\x1b[0m");
            return;
        };

        let verb = if confirm { "Confirming" } else { "Rejecting" };
        eprintln!("  \x1b[33m\u{25CB} {verb} {}\x1b[0m", action.id);

        match self.controller.decide(&action.id, confirm).await {
            Ok(response) => {
                if let Some(tx_hash) = response.tx_hash {
                    eprintln!("  \x1b[32m\u{25CF} submitted: {tx_hash}\x1b[0m");
                    if let Some(url) = explorer::explorer_tx_url(self.chain_id, &tx_hash) {
                        eprintln!("    \x1b[4m{url}\x1b[0m");
                    }
                } else if confirm {
                    eprintln!("  \x1b[32m\u{25CF} confirmed\x1b[0m");
                } else {
                    eprintln!("  \x1b[32m\u{25CF} rejected\x1b[0m");
                }
            }
            Err(e) => eprintln!("  \x1b[31m\u{2717} {e}\x1b[0m"),
        }
    }

    async fn resolve_action_arg(&self, arg: &str) -> Option<ChatAction> {
        if arg.is_empty() {
            self.current_review().await
        } else {
            self.controller.action(arg).await
        }
    }

    async fn print_pending_tx(&self, arg: &str) {
        let Some(action) = self.resolve_action_arg(arg).await else {
            eprintln!("  \x1b[90mno matching action\x1b[0m");
            return;
        };

        // An open edit buffer shadows the original payload
        if let Some(buffer) = self.controller.edit_buffer().await {
            if buffer.action_id == action.id {
                println!("\x1b[90m(edited draft)\x1b[0m");
                println!("{}", buffer.text);
                return;
            }
        }

        match action.task {
            Some(ref task) => match serde_json::to_string_pretty(&task.tx) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("  \x1b[31m{e}\x1b[0m"),
            },
            None => eprintln!("  \x1b[90maction {} has no payload yet\x1b[0m", action.id),
        }
    }

    async fn open_editor(&self, arg: &str) {
        let Some(action) = self.resolve_action_arg(arg).await else {
            eprintln!("  \x1b[90mno matching action\x1b[0m");
            return;
        };

        match self.controller.open_editor(&action.id).await {
            Ok(text) => {
                println!("\x1b[90mediting {}; /set <json> to replace, yes to confirm\x1b[0m", action.id);
                println!("{text}");
            }
            Err(e) => eprintln!("  \x1b[31m{e}\x1b[0m"),
        }
    }

    fn print_address(&self) {
        match self.agent_address {
            Some(ref address) => {
                println!("{address}");
                if let Some(url) = explorer::explorer_address_url(self.chain_id, address) {
                    println!("\x1b[90m{url}\x1b[0m");
                }
            }
            None => eprintln!("  \x1b[90mno agent address in the stored session\x1b[0m"),
        }
    }

    async fn print_balance(&self) {
        let Some(ref address) = self.agent_address else {
            eprintln!("  \x1b[90mno agent address in the stored session\x1b[0m");
            return;
        };
        let Some(ref rpc) = self.rpc else {
            eprintln!("  \x1b[90mno RPC endpoint configured; set AGENTLINE_RPC_URL\x1b[0m");
            return;
        };

        match rpc.get_balance(address).await {
            Ok(wei) => println!("{} ETH", format_eth(wei)),
            Err(e) => eprintln!("  \x1b[31m{e}\x1b[0m"),
        }
    }

    fn open_explorer(&self, tx_hash: &str) {
        match explorer::explorer_tx_url(self.chain_id, tx_hash) {
            Some(url) => {
                if let Err(e) = open::that(&url) {
                    tracing::debug!("could not open browser: {e}");
                    println!("\x1b[4m{url}\x1b[0m");
                } else {
                    println!("\x1b[90mopening {url}\x1b[0m");
                }
            }
            None => eprintln!(
                "  \x1b[90mno explorer known for chain {}\x1b[0m",
                self.chain_id
            ),
        }
    }

    async fn print_agent_states(&self) {
        let states = self.controller.agent_states().await;
        if states.is_empty() {
            return;
        }
        eprintln!("  \x1b[1mActive agents\x1b[0m");
        for (agent_id, description) in states {
            let name = self.directory.display_name(&agent_id);
            eprintln!("  \x1b[32m{name}\x1b[0m \x1b[90m{description}\x1b[0m");
        }
        eprintln!();
    }

    /// Print newly observed actions and state transitions.
    ///
    /// User messages are not echoed live (the user just typed them); the
    /// full timeline is available via `/history`.
    async fn print_new_activity(&mut self) {
        let timeline = self.controller.timeline().await;
        for item in timeline {
            let TimelineItem::Action(action) = item else {
                continue;
            };
            let seen = self.printed_states.get(&action.id).copied();
            if seen == Some(action.state) {
                continue;
            }
            self.printed_states.insert(action.id.clone(), action.state);
            self.print_action(&action, seen.is_none());
        }
    }

    async fn print_timeline(&mut self, full: bool) {
        let timeline = self.controller.timeline().await;
        if full && timeline.is_empty() {
            eprintln!("  \x1b[90mno messages yet\x1b[0m");
            return;
        }
        for item in timeline {
            match item {
                TimelineItem::Message(message) => {
                    let time = message.created_at.format("%H:%M:%S");
                    println!("\x1b[90m[{time}]\x1b[0m \x1b[1mYou\x1b[0m {}", message.content);
                }
                TimelineItem::Action(action) => {
                    self.printed_states.insert(action.id.clone(), action.state);
                    self.print_action(&action, true);
                }
            }
        }
    }

    fn print_action(&self, action: &ChatAction, include_response: bool) {
        let width = terminal_width();
        let name = self.directory.display_name(&action.agent_id);

        if include_response {
            if let Some(ref task) = action.task {
                if !task.response.is_empty() {
                    let sep_width = width.min(80);
                    eprintln!("\x1b[90m{}\x1b[0m", "\u{2500}".repeat(sep_width));
                    eprintln!("\x1b[1m{name}\x1b[0m \x1b[90m({})\x1b[0m", action.skill);
                    let text = termimad::FmtText::from(&self.skin, &task.response, Some(width));
                    eprint!("{text}");
                }
            }
        }

        match action.state {
            ActionState::Reviewing => {
                if let Some(ref task) = action.task {
                    self.print_approval_card(action, &task.tx);
                }
            }
            ActionState::Processed => match action.outcome() {
                Some(ActionOutcome::Receipt(receipt)) => {
                    eprintln!(
                        "  \x1b[32m\u{25CF} {}: processed\x1b[0m \x1b[90m{}\x1b[0m",
                        action.id, receipt.transaction_hash
                    );
                    if let Some(url) =
                        explorer::explorer_tx_url(self.chain_id, &receipt.transaction_hash)
                    {
                        eprintln!("    \x1b[4m{url}\x1b[0m");
                    }
                }
                Some(ActionOutcome::CallReturn(value)) => {
                    eprintln!("  \x1b[32m\u{25CF} {}: returned {value}\x1b[0m", action.id);
                }
                None => {
                    eprintln!("  \x1b[32m\u{25CF} {}: processed\x1b[0m", action.id);
                }
            },
            ActionState::Rejected => {
                eprintln!("  \x1b[31m\u{2717} {}: rejected\x1b[0m", action.id);
            }
            state => {
                eprintln!("  \x1b[90m\u{25CB} {}: {state}\x1b[0m", action.id);
            }
        }
    }

    /// Boxed approval card for an action awaiting review.
    fn print_approval_card(&self, action: &ChatAction, tx: &crate::api::types::TaskTransaction) {
        let term_width = terminal_width();
        let box_width = (term_width.saturating_sub(4)).clamp(40, 60);

        let short_id = if action.id.len() > 12 {
            &action.id[..12]
        } else {
            &action.id
        };

        let top_label = format!(" {} requires confirmation ", action.skill);
        let top_fill = box_width.saturating_sub(top_label.len() + 1);
        let bot_label = format!(" {short_id} ");
        let bot_fill = box_width.saturating_sub(bot_label.len() + 2);

        eprintln!();
        eprintln!(
            "  \u{250C}\x1b[33m{top_label}\x1b[0m{}",
            "\u{2500}".repeat(top_fill)
        );
        eprintln!("  \u{2502} \x1b[36mcontract:\x1b[0m {}", tx.address);
        if !tx.contract_name.is_empty() {
            eprintln!("  \u{2502} \x1b[36mname:\x1b[0m {}", tx.contract_name);
        }
        eprintln!("  \u{2502} \x1b[36mmethod:\x1b[0m {}", tx.method_signature);
        for (index, argument) in tx.arguments.iter().enumerate() {
            eprintln!("  \u{2502} \x1b[36marg[{index}]:\x1b[0m {argument}");
        }
        eprintln!("  \u{2502}");
        eprintln!(
            "  \u{2502} \x1b[32myes\x1b[0m (y) / \x1b[31mno\x1b[0m (n) / \x1b[34m/edit\x1b[0m to modify"
        );
        eprintln!(
            "  \u{2514}\u{2500}\x1b[90m{bot_label}\x1b[0m{}",
            "\u{2500}".repeat(bot_fill)
        );
        eprintln!();
    }
}

/// Read lines on a dedicated thread so rustyline's blocking readline never
/// stalls the runtime. Lines flow to the async loop over a channel.
fn spawn_input_thread(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let config = LineConfig::builder()
            .history_ignore_dups(true)
            .expect("valid config")
            .auto_add_history(true)
            .completion_type(CompletionType::List)
            .build();

        let mut rl = match Editor::with_config(config) {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("Failed to initialize line editor: {e}");
                return;
            }
        };
        rl.set_helper(Some(ReplHelper));

        let hist_path = history_path();
        if let Some(parent) = hist_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.load_history(&hist_path);

        loop {
            match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let is_quit = matches!(line.to_lowercase().as_str(), "/quit" | "/exit");
                    if tx.blocking_send(line).is_err() || is_quit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send("/quit".to_string());
                    break;
                }
                Err(e) => {
                    eprintln!("Input error: {e}");
                    break;
                }
            }
        }

        let _ = rl.save_history(&history_path());
    });
}
