//! Slash commands for interactive mode

mod history;
mod model;
mod settings;

pub use history::format_history;
pub use model::{ModelCommand, format_models};
pub use settings::{ChatSettings, SettingsCommand, clamp_temperature};

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Show the last `n` messages (all if `None`)
    History(Option<usize>),
    /// List installed models
    ListModels,
    /// Switch to another model
    ChangeModel(String),
    /// Download a model
    Pull(String),
    /// Remove an installed model
    Delete(String),
    /// Set the sampling temperature
    SetTemperature(f64),
    /// Turn streaming on or off
    SetStream(bool),
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, settings: &ChatSettings) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" => match args {
            "" => CommandResult::History(None),
            n => match n.parse::<usize>() {
                Ok(n) => CommandResult::History(Some(n)),
                Err(_) => CommandResult::Message(format!("Not a message count: '{}'", n)),
            },
        },

        "models" => CommandResult::ListModels,

        "model" | "m" => ModelCommand::switch(args),

        "pull" => ModelCommand::pull(args),

        "delete" => ModelCommand::delete(args),

        "temp" | "temperature" => SettingsCommand::temperature(args, settings),

        "stream" => SettingsCommand::stream(args, settings),

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /clear, /c           Clear conversation history (system prompt included)
  /history [n]         Show the conversation, or only the last n messages
  /models              List installed models
  /model, /m <name>    Switch to another model
  /pull <name>         Download a model (Ctrl-C cancels)
  /delete <name>       Remove an installed model
  /temp [value]        Show or set temperature (0.1 - 2.0)
  /stream [on|off]     Show or toggle streamed replies
  /quit, /exit, /q     Exit oreo

Examples:
  /model llama3:8b     Chat with llama3:8b from now on
  /pull qwen2.5:7b     Download qwen2.5:7b
  /history 4           Show the last two exchanges"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> Option<CommandResult> {
        execute_command(input, &ChatSettings::default())
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(run("hello there"), None);
    }

    #[test]
    fn test_aliases() {
        assert_eq!(run("/q"), Some(CommandResult::Exit));
        assert_eq!(run("/EXIT"), Some(CommandResult::Exit));
        assert_eq!(run("  /clear  "), Some(CommandResult::Clear));
        assert!(matches!(run("/?"), Some(CommandResult::Message(_))));
    }

    #[test]
    fn test_history_count() {
        assert_eq!(run("/history"), Some(CommandResult::History(None)));
        assert_eq!(run("/history 4"), Some(CommandResult::History(Some(4))));
        assert!(matches!(run("/history many"), Some(CommandResult::Message(_))));
    }

    #[test]
    fn test_model_commands() {
        assert_eq!(run("/models"), Some(CommandResult::ListModels));
        assert_eq!(
            run("/model llama3:8b"),
            Some(CommandResult::ChangeModel("llama3:8b".into()))
        );
        assert_eq!(
            run("/pull qwen2.5:7b"),
            Some(CommandResult::Pull("qwen2.5:7b".into()))
        );
        assert_eq!(
            run("/delete old"),
            Some(CommandResult::Delete("old".into()))
        );
        assert!(matches!(run("/pull"), Some(CommandResult::Message(_))));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(run("/frobnicate x"), Some(CommandResult::Unknown("frobnicate".into())));
    }
}
