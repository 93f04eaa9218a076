//! Prompt assembly for the completion call
//!
//! Builds `[system, ...history oldest-first, user(new message)]` from a
//! newest-first slice of the message log. Pure: no store or network access.

use crate::db::{MessageRecord, Sender};
use crate::llm::PromptMessage;

/// Instruction placed at the head of every prompt
pub const SYSTEM_INSTRUCTION: &str = "You are a homeless assistant";

/// Number of logged messages carried into each prompt
pub const HISTORY_WINDOW: usize = 3;

/// Assemble the ordered prompt for one turn.
///
/// `history` must be newest-first, as returned by the message store.
pub fn assemble(
    system_instruction: &str,
    history: &[MessageRecord],
    new_message: &str,
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(system_instruction));
    messages.extend(history.iter().rev().map(|record| match record.sender {
        Sender::User => PromptMessage::user(record.body.clone()),
        Sender::Assistant => PromptMessage::assistant(record.body.clone()),
    }));
    messages.push(PromptMessage::user(new_message));
    messages
}
