// Library interface for corellm-cli so integration tests can reach the
// command parser. commands.rs is also declared by main.rs, hence the path
// attribute.

#[path = "commands.rs"]
pub mod commands;

pub use commands::{format_memory, handle_command, CommandResult};
