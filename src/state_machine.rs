//! Core subscription state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition` decides, the runtime executes the resulting effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{Command, SubscriptionState, TurnAction};
pub use transition::transition;
