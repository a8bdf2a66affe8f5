//! Chat message and summary records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TITLE_MAX_CHARS: usize = 30;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Ai,
}

/// A server-confirmed chat message.
///
/// `client_ref` echoes the client-generated correlation token attached on
/// the send path; it is the reconciliation match key for optimistic entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of the paginated chat sidebar, most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Derive a chat title from its first message: the first 30 characters,
/// with a `...` marker when truncated.
pub fn derive_chat_title(first_message: &str) -> String {
    let mut title: String = first_message.chars().take(TITLE_MAX_CHARS).collect();
    if first_message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}
