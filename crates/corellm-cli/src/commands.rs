use corellm_core::{Role, Turn};

/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Reset memory to the system prompt.
    Clear,
    /// Print the conversation memory.
    ShowMemory,
    /// Replace the system turn.
    SetSystemPrompt(String),
    /// One-off prompt that ignores and does not touch memory.
    Ask(String),
    /// Quit the application.
    Quit,
    /// Not a command - treat as a chat message.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    if !input.starts_with('/') {
        return CommandResult::NotACommand;
    }

    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,
        "/clear" => CommandResult::Clear,
        "/memory" | "/history" => CommandResult::ShowMemory,
        "/system" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /system <prompt>".into())
            } else {
                CommandResult::SetSystemPrompt(arg.to_string())
            }
        }
        "/ask" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /ask <message>".into())
            } else {
                CommandResult::Ask(arg.to_string())
            }
        }
        "/version" => CommandResult::Message(format!("CoreLLM v{}", env!("CARGO_PKG_VERSION"))),
        _ => CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands.")),
    }
}

/// Render memory one turn per line, prefixed by role.
pub fn format_memory(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = match t.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("[{role}] {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn show_help() -> CommandResult {
    let help_text = "\
CoreLLM commands

  /clear              Reset memory to the system prompt
  /memory, /history   Show conversation memory
  /system <prompt>    Replace the system turn in memory
  /ask <message>      One-off prompt without memory
  /version            Show version information
  /help, /h           Show this help message
  /exit, /quit, /q    Quit

Anything else is sent as a chat message.";

    CommandResult::Message(help_text.into())
}
