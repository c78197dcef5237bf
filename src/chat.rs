//! Interactive terminal chat.
//!
//! One `tracker chat` process is one session: the transcript and selection
//! live in a [`SessionState`] owned by the loop and disappear when it ends.
//! Sample queries are offered until the first question is asked.
//!
//! # Commands
//!
//! | Input | Effect |
//! |-------|--------|
//! | any text | ask the knowledge base |
//! | `/docs` | list documents |
//! | `/select <n or key>` | select a document |
//! | `/workflow <option>` | select a workflow option and ask its templated question |
//! | `/options` | list workflow options |
//! | `/sample <n>` | ask a sample query |
//! | `/history` | reprint the transcript |
//! | `/dismiss` | clear the last error |
//! | `/quit` | end the session |
//!
//! Failures never end the loop: they are printed and the session keeps its
//! transcript and selection so the user can retry.

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::controller::Controller;
use crate::error::{SessionError, TurnError};
use crate::models::{ChatMessage, DocumentRecord};
use crate::render;
use crate::session::{SessionPhase, SessionState};

/// A parsed line of chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    Documents,
    Select(String),
    Workflow(String),
    Options,
    Sample(usize),
    History,
    Dismiss,
    Help,
    Quit,
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<ChatCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(ChatCommand::Ask(line.trim_end_matches(['\r', '\n']).to_string()));
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (trimmed, ""),
    };

    let command = match (name, arg) {
        ("/docs", _) => ChatCommand::Documents,
        ("/select", arg) if !arg.is_empty() => ChatCommand::Select(arg.to_string()),
        ("/workflow", arg) if !arg.is_empty() => ChatCommand::Workflow(arg.to_string()),
        ("/options", _) => ChatCommand::Options,
        ("/sample", arg) => match arg.parse::<usize>() {
            Ok(n) if n > 0 => ChatCommand::Sample(n),
            _ => ChatCommand::Unknown(trimmed.to_string()),
        },
        ("/history", _) => ChatCommand::History,
        ("/dismiss", _) => ChatCommand::Dismiss,
        ("/help", _) => ChatCommand::Help,
        ("/quit" | "/exit", _) => ChatCommand::Quit,
        _ => ChatCommand::Unknown(trimmed.to_string()),
    };
    Some(command)
}

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

const HELP: &str = "Commands: /docs, /select <n or key>, /workflow <option>, /options, \
/sample <n>, /history, /dismiss, /quit";

/// A terminal chat session bound to a controller.
pub struct ChatSession<'a> {
    controller: &'a Controller,
    state: SessionState,
    documents: Vec<DocumentRecord>,
    show_context: bool,
}

impl<'a> ChatSession<'a> {
    pub fn new(controller: &'a Controller, show_context: bool) -> Self {
        Self {
            controller,
            state: SessionState::new(),
            documents: Vec::new(),
            show_context,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Text shown before the first prompt: the catalog, and the sample
    /// queries while the chat has not started.
    pub async fn banner(&mut self) -> String {
        let mut out = self.refresh_documents().await;
        if !self.state.chat_started() && !self.controller.sample_queries().is_empty() {
            out.push('\n');
            out.push_str(&render::render_sample_queries(self.controller.sample_queries()));
        }
        out.push_str(HELP);
        out
    }

    async fn refresh_documents(&mut self) -> String {
        match self.controller.documents().await {
            Ok(documents) => {
                self.documents = documents;
                render::render_documents(&self.documents)
            }
            Err(err) => render::render_error(&TurnError::Catalog(err)) + "\n",
        }
    }

    async fn ask(&mut self, text: &str) -> String {
        match self.controller.ask(&mut self.state, text).await {
            Ok(turn) => render::render_turn(&turn, self.show_context),
            Err(err) => failure(&err),
        }
    }

    /// Resolve `/select` input: a 1-based index into the last listing, or a key.
    fn resolve_selection(&self, arg: &str) -> Option<String> {
        if let Ok(n) = arg.parse::<usize>() {
            return self
                .documents
                .get(n.checked_sub(1)?)
                .map(|doc| doc.key.clone());
        }
        Some(arg.to_string())
    }

    pub async fn handle(&mut self, command: ChatCommand) -> (Flow, String) {
        let out = match command {
            ChatCommand::Quit => return (Flow::Quit, "Goodbye!".to_string()),
            ChatCommand::Ask(text) => self.ask(&text).await,
            ChatCommand::Documents => self.refresh_documents().await,
            ChatCommand::Select(arg) => match self.resolve_selection(&arg) {
                Some(key) => match self.controller.select_document(&mut self.state, &key).await {
                    Ok(doc) => format!("Selected {}", doc.label()),
                    Err(err) => failure(&err),
                },
                None => failure(&TurnError::Session(SessionError::UnknownDocument(arg))),
            },
            ChatCommand::Workflow(label) => {
                match self.controller.select_workflow(&mut self.state, &label) {
                    Ok(()) => match self.controller.run_workflow(&mut self.state).await {
                        Ok(turn) => render::render_turn(&turn, self.show_context),
                        Err(err) => failure(&err),
                    },
                    Err(err) => failure(&TurnError::Session(err)),
                }
            }
            ChatCommand::Options => self
                .controller
                .workflow_options()
                .iter()
                .map(|o| format!("  - {}", o))
                .collect::<Vec<_>>()
                .join("\n"),
            ChatCommand::Sample(n) => match n
                .checked_sub(1)
                .and_then(|i| self.controller.sample_queries().get(i))
            {
                Some(query) => {
                    let query = query.clone();
                    let echo = render::render_message(&ChatMessage::user(&query));
                    format!("{}\n{}", echo, self.ask(&query).await)
                }
                None => format!("No sample query #{}", n),
            },
            ChatCommand::History => render::render_history(self.state.history()),
            ChatCommand::Dismiss => {
                self.state.dismiss_error();
                "Ready.".to_string()
            }
            ChatCommand::Help => HELP.to_string(),
            ChatCommand::Unknown(input) => format!("Unknown command: {}\n{}", input, HELP),
        };
        (Flow::Continue, out)
    }
}

fn failure(err: &TurnError) -> String {
    format!(
        "{}\n{}",
        render::render_error(err),
        "Your question is kept in the history; try again or /dismiss.".bright_black()
    )
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run_chat(controller: &Controller, show_context: bool) -> Result<()> {
    let mut chat = ChatSession::new(controller, show_context);
    let mut rl = DefaultEditor::new()?;

    println!("{}", "=== M & A Projects Tracker ===".bright_magenta().bold());
    println!("{}", chat.banner().await);

    loop {
        let prompt = match chat.state().phase() {
            SessionPhase::Error { .. } => "!> ",
            _ => ">> ",
        };
        match rl.readline(prompt) {
            Ok(line) => {
                let Some(command) = parse_command(&line) else {
                    continue;
                };
                if let Err(err) = rl.add_history_entry(line.as_str()) {
                    tracing::debug!(error = %err, "could not record input history");
                }
                let (flow, out) = chat.handle(command).await;
                println!("{}", out);
                if flow == Flow::Quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type /quit to exit.".yellow());
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    tracing::debug!(
        session = %chat.state().id(),
        messages = chat.state().history().len(),
        "chat session ended"
    );
    Ok(())
}
