//! Pure state transition function

use super::state::{Command, SubscriptionState, TurnAction, GREETING, ONBOARDING_PROMPT};
use super::{Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: SubscriptionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SubscriptionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same state and event it always yields the same result and
/// performs no I/O.
pub fn transition(
    state: SubscriptionState,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (state, Event::Inbound { text }) => {
            let result = match TurnAction::for_inbound(state, Command::classify(&text)) {
                TurnAction::OptIn => TransitionResult::new(SubscriptionState::Subscribed)
                    .with_effect(Effect::PersistSubscription { opted_in: true })
                    .with_effect(Effect::send_text(GREETING)),

                TurnAction::OptOut => TransitionResult::new(SubscriptionState::NotSubscribed)
                    .with_effect(Effect::PersistSubscription { opted_in: false }),

                TurnAction::Onboarding => TransitionResult::new(SubscriptionState::NotSubscribed)
                    .with_effect(Effect::send_text(ONBOARDING_PROMPT)),

                TurnAction::Assistant => TransitionResult::new(SubscriptionState::Subscribed)
                    .with_effect(Effect::persist_user_message(text.clone()))
                    .with_effect(Effect::RequestCompletion { message: text }),
            };
            Ok(result)
        }

        (SubscriptionState::Subscribed, Event::CompletionReady { reply }) => {
            Ok(TransitionResult::new(SubscriptionState::Subscribed)
                .with_effect(Effect::persist_assistant_message(reply.clone()))
                .with_effect(Effect::send_text(reply)))
        }

        // Nothing to deliver; the controller records the turn as dropped
        (SubscriptionState::Subscribed, Event::CompletionFailed { .. }) => {
            Ok(TransitionResult::new(SubscriptionState::Subscribed))
        }

        (SubscriptionState::NotSubscribed, event) => Err(TransitionError::InvalidTransition(
            format!("{event:?} while not subscribed"),
        )),
    }
}
