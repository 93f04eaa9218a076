//! Effects produced by state transitions

use crate::db::Sender;

/// Effects to be executed, in order, after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Upsert the address's opt-in flag
    PersistSubscription { opted_in: bool },

    /// Append to the address's message log
    PersistMessage { sender: Sender, body: String },

    /// Fetch history, assemble the prompt and call the completion capability
    RequestCompletion { message: String },

    /// Text the address
    SendText { body: String },
}

impl Effect {
    pub fn persist_user_message(body: impl Into<String>) -> Self {
        Effect::PersistMessage {
            sender: Sender::User,
            body: body.into(),
        }
    }

    pub fn persist_assistant_message(body: impl Into<String>) -> Self {
        Effect::PersistMessage {
            sender: Sender::Assistant,
            body: body.into(),
        }
    }

    pub fn send_text(body: impl Into<String>) -> Self {
        Effect::SendText { body: body.into() }
    }
}
