//! /model, /models, /pull and /delete

use super::CommandResult;
use oreo_client::ModelInfo;

pub struct ModelCommand;

impl ModelCommand {
    /// `/model <name>`; without a name, list what is installed
    pub fn switch(args: &str) -> CommandResult {
        match single_name(args) {
            Some(name) => CommandResult::ChangeModel(name),
            None => CommandResult::ListModels,
        }
    }

    pub fn pull(args: &str) -> CommandResult {
        match single_name(args) {
            Some(name) => CommandResult::Pull(name),
            None => CommandResult::Message("Usage: /pull <model>".to_string()),
        }
    }

    pub fn delete(args: &str) -> CommandResult {
        match single_name(args) {
            Some(name) => CommandResult::Delete(name),
            None => CommandResult::Message("Usage: /delete <model>".to_string()),
        }
    }
}

fn single_name(args: &str) -> Option<String> {
    args.split_whitespace().next().map(str::to_string)
}

/// Render installed models, marking the current one
pub fn format_models(current: &str, models: &[ModelInfo]) -> String {
    if models.is_empty() {
        return "No models installed. Download one with: /pull <name>".to_string();
    }

    let width = models.iter().map(|m| m.name.len()).max().unwrap_or(0);
    let mut output = String::from("Installed models:\n");
    for model in models {
        let marker = if model.name == current { "*" } else { " " };
        output.push_str(&format!(
            "{} {:<width$}  {}  {:>9.1} MiB  {}\n",
            marker,
            model.name,
            model.short_digest(),
            model.size_mib(),
            model.modified_at,
            width = width,
        ));
    }

    output.push_str("\nSwitch with: /model <name>");
    output
}
