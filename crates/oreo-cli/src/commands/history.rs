//! /history rendering

use oreo_client::{Message, Role};

/// Render messages one per block, labelled by role
pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages yet.".to_string();
    }

    messages
        .iter()
        .map(|message| {
            let label = match message.role {
                Role::System => "system",
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            format!("[{}] {}", label, message.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
