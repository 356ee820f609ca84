//! Line commands understood by the interactive shell.

use crate::session::ChatTurn;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Exit,
    Help,
    History,
    /// `/add` with its path, `None` when the path is missing
    Add(Option<String>),
    Query(String),
}

impl ShellCommand {
    pub fn parse(line: &str) -> ShellCommand {
        let line = line.trim();
        match line {
            "" => return ShellCommand::Empty,
            "/exit" => return ShellCommand::Exit,
            "/help" => return ShellCommand::Help,
            "/history" => return ShellCommand::History,
            _ => {}
        }

        if let Some(rest) = line.strip_prefix("/add") {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                let path = rest.trim();
                return ShellCommand::Add((!path.is_empty()).then(|| path.to_string()));
            }
        }
        ShellCommand::Query(line.to_string())
    }
}

pub fn banner(llm: &str, embeddings: &str) -> String {
    format!(
        "Welcome to the Interactive LLM Agent!\n\
         Using LLM: {llm}\n\
         Using Embeddings: {embeddings}\n\
         Type /help to see available commands"
    )
}

pub fn help_text() -> &'static str {
    "\nAvailable commands:\n  \
     /add <filepath> - Add a file for the next query\n  \
     /history - Show conversation history\n  \
     /help - Show this help message\n  \
     /exit - Exit the program"
}

pub fn format_history(history: &[ChatTurn]) -> String {
    let mut out = String::from("\nConversation history:");
    for (i, turn) in history.iter().enumerate() {
        out.push_str(&format!("\n{}: {}", i + 1, turn));
    }
    out
}
