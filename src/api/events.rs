use serde::Serialize;

use crate::aggregator::{Conversation, DisplayMessage};

/// What the inbox tells the view layer. Each event carries a full copy of
/// what should be on screen, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboxEvent {
    ConversationsUpdated {
        conversations: Vec<Conversation>,
        selected: Option<String>,
    },
    ThreadUpdated {
        key: String,
        display_name: String,
        messages: Vec<DisplayMessage>,
    },
    MessageSent {
        key: String,
    },
    SendFailed {
        key: Option<String>,
        reason: String,
    },
    /// A refresh failed outright; whatever is on screen stays.
    FetchFailed {
        reason: String,
    },
}
