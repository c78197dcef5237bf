//! Terminal rendering.
//!
//! Turns catalog entries, transcript messages, citations and errors into
//! the lines printed by the `tracker` CLI. Source documents are highlighted
//! in yellow, the "No Context" notice in red.

use colored::Colorize;

use crate::error::TurnError;
use crate::models::{ChatMessage, DocumentRecord, Role};
use crate::session::{CitationView, Turn};

/// The sidebar: one numbered `Company - City` line per document.
pub fn render_documents(documents: &[DocumentRecord]) -> String {
    let mut out = format!("{}\n", "Project List".bold());
    if documents.is_empty() {
        out.push_str("  (no documents found)\n");
        return out;
    }
    for (i, doc) in documents.iter().enumerate() {
        out.push_str(&format!(
            "  {:>2}. {:<32} {}\n",
            i + 1,
            doc.label(),
            doc.key.dimmed()
        ));
    }
    out
}

pub fn render_message(message: &ChatMessage) -> String {
    match message.role {
        Role::User => format!("{} {}", "you>".green().bold(), message.text),
        Role::Assistant => format!("{} {}", "assistant>".cyan().bold(), message.text),
    }
}

pub fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n")
}

/// The line under an answer: its source document, or "No Context".
pub fn render_citation(citation: &CitationView, show_context: bool) -> String {
    match citation {
        CitationView::Source { uri, context } => {
            let mut out = format!("{} {}", "Source Document:".yellow(), uri);
            if show_context {
                if let Some(text) = context {
                    out.push_str(&format!("\n{} {}", "Context used:".yellow(), text));
                }
            }
            out
        }
        CitationView::NoContext => "No Context".red().to_string(),
    }
}

pub fn render_turn(turn: &Turn, show_context: bool) -> String {
    format!(
        "{}\n{}",
        render_message(&ChatMessage::assistant(turn.answer.clone())),
        render_citation(&turn.citation, show_context)
    )
}

pub fn render_error(err: &TurnError) -> String {
    format!("{} {}", "Error:".red().bold(), err)
}

pub fn render_sample_queries(queries: &[String]) -> String {
    let mut out = format!("{}\n", "Sample Queries".bold());
    for (i, q) in queries.iter().enumerate() {
        out.push_str(&format!("  [{}] {}\n", i + 1, q));
    }
    out
}
