//! Flattens an OpenAI message history into the single-turn transcript the
//! upstream expects.

use crate::openai::{ChatMessage, MessageContent};

const HUMAN: &str = "Human";
const ASSISTANT: &str = "Assistant";

fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => serde_json::to_string(parts).unwrap_or_default(),
    }
}

/// System messages come first, verbatim. The rest become
/// `Human: ...` / `Assistant: ...` turns separated by blank lines, and the
/// transcript always ends on an open `Assistant:` turn.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    let mut pieces: Vec<String> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| content_text(&m.content))
        .collect();

    for message in messages.iter().filter(|m| m.role != "system") {
        let speaker = if message.role == "user" { HUMAN } else { ASSISTANT };
        pieces.push(format!("\n\n{}: {}", speaker, content_text(&message.content)));
    }

    let open_turn = pieces
        .last()
        .map(|last| last.trim().starts_with("Assistant:"))
        .unwrap_or(false);
    if !open_turn {
        pieces.push(format!("\n\n{}:", ASSISTANT));
    }

    let transcript = pieces.concat();
    match transcript.strip_prefix("\n\n") {
        Some(rest) => rest.to_string(),
        None => transcript,
    }
}
