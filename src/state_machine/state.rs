//! Subscription state and inbound command classification

use crate::db::SubscriberRecord;
use serde::{Deserialize, Serialize};

/// Replies that opt an address in (matched after trim + lowercase)
pub const OPT_IN_KEYWORDS: [&str; 3] = ["yes", "yeah", "y-e-a-h"];

/// Reply that opts an address out
pub const OPT_OUT_KEYWORD: &str = "stop";

/// Sent after a successful opt-in
pub const GREETING: &str = "How can I help you?";

/// Sent to addresses that are not subscribed and sent something other than a command
pub const ONBOARDING_PROMPT: &str =
    "Thank you for texting us. We're happy to help. Reply YES to opt-in. Reply STOP to stop.";

/// Per-address subscription state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// No record, or a record with `opted_in = false`
    #[default]
    NotSubscribed,
    Subscribed,
}

impl SubscriptionState {
    /// Absence of a record and `opted_in = false` are the same state.
    pub fn from_record(record: Option<&SubscriberRecord>) -> Self {
        Self::from_opted_in(record.is_some_and(|r| r.opted_in))
    }

    pub fn from_opted_in(opted_in: bool) -> Self {
        if opted_in {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::NotSubscribed
        }
    }
}

/// What a normalized inbound body asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OptIn,
    OptOut,
    Text,
}

impl Command {
    /// Classify an already-normalized (trimmed, lowercased) body.
    /// Matching is exact; "yes please" is ordinary text.
    pub fn classify(message: &str) -> Self {
        if OPT_IN_KEYWORDS.contains(&message) {
            Command::OptIn
        } else if message == OPT_OUT_KEYWORD {
            Command::OptOut
        } else {
            Command::Text
        }
    }
}

/// Branch taken for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    OptIn,
    OptOut,
    Onboarding,
    Assistant,
}

impl TurnAction {
    /// Commands apply in either state; plain text is gated on subscription.
    pub fn for_inbound(state: SubscriptionState, command: Command) -> Self {
        match (command, state) {
            (Command::OptIn, _) => TurnAction::OptIn,
            (Command::OptOut, _) => TurnAction::OptOut,
            (Command::Text, SubscriptionState::NotSubscribed) => TurnAction::Onboarding,
            (Command::Text, SubscriptionState::Subscribed) => TurnAction::Assistant,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnAction::OptIn => "opt_in",
            TurnAction::OptOut => "opt_out",
            TurnAction::Onboarding => "onboarding",
            TurnAction::Assistant => "assistant",
        }
    }
}
