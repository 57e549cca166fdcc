//! System prompt rendering and the attachment note.

use chrono::{DateTime, Local};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant with access to tools for looking things up on the web, \
on Wikipedia and on YouTube. Use them when the question needs current or specific \
information, and say which source you used.

- Current date and time: {current_datetime}
- Be concise but complete, and format answers for readability.
- Say so when you do not know something instead of guessing.
- Ask for clarification when a request is ambiguous before calling tools.";

/// Substitute `{current_datetime}` in a prompt template.
pub fn render_system_prompt(template: &str, now: DateTime<Local>) -> String {
    template.replace(
        "{current_datetime}",
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// The system message staged ahead of a user message that carries a file.
pub fn attachment_note(file_name: &str, file_content: &str, user_message: &str) -> String {
    format!(
        "The user has attached a file named '{file_name}' with the following content:\n\n\
         {file_content}\n\nPlease process this file along with their message: {user_message}"
    )
}
