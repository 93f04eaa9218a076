//! Conversation controller
//!
//! Runs one turn per inbound message: validates it, reads the subscription
//! state, asks the pure state machine what to do, and executes the resulting
//! effects against the store, the completion capability and the SMS
//! transport. Failures inside a turn never reach the inbound caller; they are
//! folded into a [`TurnReport`] and logged.
//!
//! Turns for the same address are not serialized. Two concurrent messages may
//! interleave registry and log writes; the store is the only arbiter.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::context::{assemble, HISTORY_WINDOW, SYSTEM_INSTRUCTION};
use crate::db::{MessageRecord, Sender};
use crate::llm::{LlmRequest, LlmService};
use crate::sms::SmsSender;
use crate::state_machine::{transition, Command, Effect, Event, SubscriptionState, TurnAction};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Controller wired to trait objects, as used by the HTTP layer
pub type DynController =
    ConversationController<Arc<dyn Storage>, Arc<dyn LlmService>, Arc<dyn SmsSender>>;

/// Rejection of an inbound message before any I/O happens
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing sender address")]
    MissingAddress,
    #[error("missing message body")]
    MissingBody,
}

/// Validated, normalized inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub address: String,
    /// Body trimmed and lowercased
    pub text: String,
}

impl InboundMessage {
    pub fn parse(address: &str, raw_body: &str) -> Result<Self, ValidationError> {
        let address = address.trim();
        let text = raw_body.trim().to_lowercase();

        if address.is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        if text.is_empty() {
            return Err(ValidationError::MissingBody);
        }

        Ok(Self {
            address: address.to_string(),
            text,
        })
    }
}

/// How a turn ended, independent of the uniform acknowledgment to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Every effect succeeded
    Delivered,
    /// Something useful happened but at least one step failed
    Degraded { issues: Vec<String> },
    /// Nothing reached the user
    Dropped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    /// `None` when the subscription state could not be read
    pub action: Option<TurnAction>,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    fn log(&self, address: &str) {
        let action = self.action.map_or("unknown", TurnAction::as_str);
        match &self.outcome {
            TurnOutcome::Delivered => {
                tracing::info!(address, action, outcome = "delivered", "Turn complete");
            }
            TurnOutcome::Degraded { issues } => {
                tracing::warn!(address, action, outcome = "degraded", ?issues, "Turn complete");
            }
            TurnOutcome::Dropped { reason } => {
                tracing::warn!(address, action, outcome = "dropped", %reason, "Turn complete");
            }
        }
    }
}

/// Tunables for the assistant branch
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub system_instruction: String,
    pub history_window: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history_window: HISTORY_WINDOW,
        }
    }
}

/// Bookkeeping for a single turn
#[derive(Debug, Default)]
struct Turn {
    /// Some effect succeeded, so a later failure degrades rather than drops
    progress: bool,
    issues: Vec<String>,
    dropped: Option<String>,
    /// Log entry written for this turn's inbound message
    user_message_id: Option<String>,
}

impl Turn {
    fn issue(&mut self, issue: String) {
        self.issues.push(issue);
    }

    fn drop_turn(&mut self, reason: String) {
        self.dropped.get_or_insert(reason);
    }

    fn into_outcome(self) -> TurnOutcome {
        match self.dropped {
            Some(reason) => TurnOutcome::Dropped { reason },
            None if self.issues.is_empty() => TurnOutcome::Delivered,
            None => TurnOutcome::Degraded {
                issues: self.issues,
            },
        }
    }
}

/// Generic controller that can work with any storage, LLM, and SMS implementations
pub struct ConversationController<S, L, T>
where
    S: Storage,
    L: LlmService,
    T: SmsSender,
{
    storage: S,
    llm: L,
    sms: T,
    settings: ControllerSettings,
}

impl<S, L, T> ConversationController<S, L, T>
where
    S: Storage,
    L: LlmService,
    T: SmsSender,
{
    pub fn new(storage: S, llm: L, sms: T, settings: ControllerSettings) -> Self {
        Self {
            storage,
            llm,
            sms,
            settings,
        }
    }

    /// Handle one inbound message.
    ///
    /// Only validation failures are returned as errors; every other failure
    /// is reported through the returned [`TurnReport`].
    pub async fn handle_inbound(
        &self,
        address: &str,
        raw_body: &str,
    ) -> Result<TurnReport, ValidationError> {
        let inbound = InboundMessage::parse(address, raw_body)?;
        let report = self.run_turn(&inbound).await;
        report.log(&inbound.address);
        Ok(report)
    }

    async fn run_turn(&self, inbound: &InboundMessage) -> TurnReport {
        let address = inbound.address.as_str();

        let record = match self.storage.get_subscriber(address).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(address, error = %e, "Failed to read subscriber");
                return TurnReport {
                    action: None,
                    outcome: TurnOutcome::Dropped {
                        reason: format!("subscriber read failed: {e}"),
                    },
                };
            }
        };

        if record.is_none() {
            if let Err(e) = self.storage.register(address).await {
                tracing::warn!(address, error = %e, "Failed to register subscriber");
            }
        }

        let mut state = SubscriptionState::from_record(record.as_ref());
        let action = TurnAction::for_inbound(state, Command::classify(&inbound.text));
        let mut turn = Turn::default();
        let mut pending = vec![Event::Inbound {
            text: inbound.text.clone(),
        }];

        'turn: while let Some(event) = pending.pop() {
            if let Event::CompletionFailed { message } = &event {
                turn.drop_turn(format!("completion failed: {message}"));
            }

            let result = match transition(state, event) {
                Ok(result) => result,
                Err(e) => {
                    turn.drop_turn(e.to_string());
                    break;
                }
            };
            state = result.new_state;

            for effect in result.effects {
                if let Some(next) = self.execute_effect(address, &mut turn, effect).await {
                    pending.push(next);
                }
                if turn.dropped.is_some() {
                    break 'turn;
                }
            }
        }

        TurnReport {
            action: Some(action),
            outcome: turn.into_outcome(),
        }
    }

    async fn execute_effect(&self, address: &str, turn: &mut Turn, effect: Effect) -> Option<Event> {
        match effect {
            Effect::PersistSubscription { opted_in } => {
                match self.storage.set_opted_in(address, opted_in).await {
                    Ok(()) => turn.progress = true,
                    Err(e) => {
                        tracing::error!(address, opted_in, error = %e, "Failed to update subscription");
                        turn.drop_turn(format!("subscription write failed: {e}"));
                    }
                }
                None
            }

            Effect::PersistMessage { sender, body } => {
                match self.storage.append(address, &body, sender, Utc::now()).await {
                    Ok(record) => {
                        turn.progress = true;
                        if sender == Sender::User {
                            turn.user_message_id = Some(record.message_id);
                        }
                    }
                    Err(e) => {
                        tracing::error!(address, %sender, error = %e, "Failed to save message");
                        turn.issue(format!("{sender} message not saved: {e}"));
                    }
                }
                None
            }

            Effect::RequestCompletion { message } => {
                let history = self.load_history(address, turn).await;
                let prompt = assemble(&self.settings.system_instruction, &history, &message);

                match self.llm.complete(&LlmRequest::new(prompt)).await {
                    Ok(response) => {
                        turn.progress = true;
                        Some(Event::CompletionReady {
                            reply: response.text,
                        })
                    }
                    Err(e) => Some(Event::CompletionFailed { message: e.message }),
                }
            }

            Effect::SendText { body } => {
                if let Err(e) = self.sms.send(address, &body).await {
                    tracing::error!(address, error = %e, "Failed to send SMS");
                    if turn.progress {
                        turn.issue(format!("reply not sent: {e}"));
                    } else {
                        turn.drop_turn(format!("send failed: {e}"));
                    }
                } else {
                    turn.progress = true;
                }
                None
            }
        }
    }

    /// The `history_window` most recent log entries before this turn's own
    /// inbound message, newest first. Read failures yield an empty history.
    async fn load_history(&self, address: &str, turn: &mut Turn) -> Vec<MessageRecord> {
        let window = self.settings.history_window;
        let own = turn.user_message_id.as_deref();
        let fetch = window.saturating_add(usize::from(own.is_some()));

        match self.storage.recent(address, fetch).await {
            Ok(records) => records
                .into_iter()
                .filter(|r| Some(r.message_id.as_str()) != own)
                .take(window)
                .collect(),
            Err(e) => {
                tracing::error!(address, error = %e, "Failed to load history");
                turn.issue(format!("history unavailable: {e}"));
                Vec::new()
            }
        }
    }
}
