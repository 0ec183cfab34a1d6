//! Interactive terminal chat over one uploaded document.

use crate::client::{ApiClient, ClientError};
use chatdoc_core::Answer;
use std::fmt::Write as _;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "you",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Conversation kept on the client for display only; the server never sees it.
#[derive(Debug, Default)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            role,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn render(&self) -> String {
        if self.turns.is_empty() {
            return "(no messages yet)\n".to_string();
        }

        let mut out = String::new();
        for turn in &self.turns {
            let _ = writeln!(out, "{:>9}: {}", turn.role.label(), turn.content);
        }
        out
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Question(&'a str),
    History,
    Clear,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/history" => Input::History,
        "/clear" => Input::Clear,
        "/help" => Input::Help,
        command if command.starts_with('/') => Input::Unknown(command),
        question => Input::Question(question),
    }
}

pub fn render_answer(answer: &Answer) -> String {
    let mut out = answer.answer.clone();
    if !answer.source_chunk_ids.is_empty() {
        let _ = write!(out, "\n  sources: {}", answer.source_chunk_ids.join(", "));
    }
    out
}

pub fn render_error(error: &ClientError) -> String {
    match error {
        ClientError::Api { kind, message, .. } => format!("{kind}: {message}"),
        ClientError::Timeout(_) => "request timed out, please try again".to_string(),
        other => other.to_string(),
    }
}

const HELP: &str = "Type a question and press enter.\n  /history  show this conversation\n  /clear    forget this conversation\n  /quit     leave\n";

/// Reads questions line by line until `/quit` or end of input. A failed
/// question is reported and the session continues.
pub async fn run_chat<R, W>(
    client: &ApiClient,
    document_id: &str,
    input: R,
    out: &mut W,
) -> anyhow::Result<ChatHistory>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut history = ChatHistory::default();
    let mut lines = input.lines();

    writeln!(out, "Chatting with document {document_id}. /help for commands.")?;
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => write!(out, "{HELP}")?,
            Input::History => write!(out, "{}", history.render())?,
            Input::Clear => {
                history.clear();
                writeln!(out, "conversation cleared")?;
            }
            Input::Unknown(command) => writeln!(out, "unknown command {command}; try /help")?,
            Input::Question(question) => {
                history.push(Role::User, question);
                match client.ask(document_id, question).await {
                    Ok(answer) => {
                        writeln!(out, "{}", render_answer(&answer))?;
                        history.push(Role::Assistant, answer.answer);
                    }
                    Err(error) => {
                        debug!(%error, "question failed");
                        writeln!(out, "error: {}", render_error(&error))?;
                    }
                }
            }
        }
    }

    Ok(history)
}
