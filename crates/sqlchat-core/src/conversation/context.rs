//! Prompt context and title helpers

use crate::types::DatabaseConnection;

/// Base prompt plus connection summary and cached schema
///
/// Sent to the provider only; never stored.
pub fn build_context_prompt(system_prompt: &str, connection: &DatabaseConnection) -> String {
    let schema = connection.cached_schema_text.trim();
    let schema = if schema.is_empty() {
        "(schema not cached)"
    } else {
        schema
    };
    format!(
        "{}\n\n{}\n\nDatabase schema:\n{}",
        system_prompt.trim_end(),
        connection.summary(),
        schema
    )
}

/// First `max_chars` characters of the utterance, whitespace-trimmed
pub fn title_prefix(utterance: &str, max_chars: usize) -> String {
    let title: String = utterance.trim().chars().take(max_chars).collect();
    title.trim_end().to_string()
}
