//! /mode command - show and set the chat mode

use super::CommandResult;
use jot_ai::ChatMode;

pub struct ModeCommand;

impl ModeCommand {
    pub fn execute(args: &str, current: ChatMode) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(show_modes(current));
        }
        match ChatMode::parse(args) {
            Some(mode) => CommandResult::ChangeMode(mode),
            None => CommandResult::Message(format!(
                "Unknown chat mode: '{}'\nValid modes: simple, reasoning",
                args
            )),
        }
    }
}

fn show_modes(current: ChatMode) -> String {
    let modes = [
        (ChatMode::Simple, "Direct answers"),
        (ChatMode::Reasoning, "Shows the model's reasoning before answering"),
    ];

    let mut output = String::from("Chat modes:\n\n");
    for (mode, desc) in modes {
        let marker = if mode == current { " *" } else { "" };
        output.push_str(&format!("  {:<10} {}{}\n", mode.as_str(), desc, marker));
    }
    output.push_str("\nSet with: /mode <mode>");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_marks_current() {
        match ModeCommand::execute("", ChatMode::Reasoning) {
            CommandResult::Message(text) => {
                assert!(text.contains("reasoning  Shows the model's reasoning before answering *"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_mode() {
        assert!(matches!(
            ModeCommand::execute("turbo", ChatMode::Simple),
            CommandResult::Message(m) if m.contains("turbo")
        ));
    }
}
