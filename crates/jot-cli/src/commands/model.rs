//! /model command - list and switch models

use super::CommandResult;

pub struct ModelCommand;

impl ModelCommand {
    /// Execute /model command - opens selector if no args, or switches to matching model
    pub fn execute(args: &str, available_models: &[String]) -> CommandResult {
        if args.is_empty() {
            // Open model selector (TUI) or list models (CLI)
            return CommandResult::OpenModelSelector;
        }
        if available_models.is_empty() {
            // Nothing to match against; trust the user
            return CommandResult::ChangeModel(args.to_string());
        }
        match find_model(args, available_models) {
            Some(model) => CommandResult::ChangeModel(model),
            None => CommandResult::Message(format!(
                "No model found matching '{}'\nUse /model to list available models",
                args
            )),
        }
    }

    /// List models as text (for CLI mode)
    pub fn list_models_text(current: Option<&str>, available_models: &[String]) -> String {
        if available_models.is_empty() {
            return "No models available".to_string();
        }

        let mut output = String::from("Available models:\n");
        for model in available_models {
            let marker = if Some(model.as_str()) == current { " *" } else { "" };
            output.push_str(&format!("  {}{}\n", model, marker));
        }
        output.push_str("\nSwitch with: /model <name>");
        output
    }
}

fn find_model(query: &str, models: &[String]) -> Option<String> {
    let query_lower = query.to_lowercase();

    // Exact match first
    if let Some(model) = models.iter().find(|m| m.to_lowercase() == query_lower) {
        return Some(model.clone());
    }

    // Partial match
    models
        .iter()
        .find(|m| m.to_lowercase().contains(&query_lower))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_beats_partial() {
        let models = vec!["qwen3:8b-instruct".to_string(), "qwen3:8b".to_string()];
        assert_eq!(
            ModelCommand::execute("QWEN3:8B", &models),
            CommandResult::ChangeModel("qwen3:8b".to_string())
        );
    }

    #[test]
    fn test_no_match_and_empty_list() {
        let models = vec!["qwen3:8b".to_string()];
        assert!(matches!(
            ModelCommand::execute("gemma", &models),
            CommandResult::Message(_)
        ));
        assert_eq!(
            ModelCommand::execute("gemma", &[]),
            CommandResult::ChangeModel("gemma".to_string())
        );
        assert_eq!(ModelCommand::execute("", &models), CommandResult::OpenModelSelector);
    }

    #[test]
    fn test_list_marks_current() {
        let models = vec!["a".to_string(), "b".to_string()];
        let text = ModelCommand::list_models_text(Some("b"), &models);
        assert!(text.contains("  b *\n"));
        assert!(text.contains("  a\n"));
    }
}
