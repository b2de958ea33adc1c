//! Slash commands for interactive mode

mod mode;
mod model;

use mode::ModeCommand;
pub use model::ModelCommand;

use jot_ai::ChatMode;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Change the model
    ChangeModel(String),
    /// Change the chat mode
    ChangeMode(ChatMode),
    /// Show a message to the user (not sent to the backend)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
    /// Open model selector (TUI only)
    OpenModelSelector,
}

/// Parse and execute a slash command
pub fn execute_command(
    input: &str,
    current_mode: ChatMode,
    available_models: &[String],
) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or_default().to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "model" | "m" => ModelCommand::execute(args, available_models),

        "mode" | "think" => ModeCommand::execute(args, current_mode),

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?           Show this help message
  /model, /m [name]       Pick a model or switch to a matching one
  /mode [simple|reasoning] Show or set the chat mode
  /clear, /c              Clear conversation history
  /quit, /exit, /q        Exit jot

Keys (TUI):
  Enter       Send message
  Esc/Ctrl+C  Stop the reply (quit when idle)
  Ctrl+T      Show or hide AI reasoning
  Ctrl+K      Select model
  Ctrl+L      Clear conversation
  Ctrl+E      Dismiss error"#
        .to_string()
}
