//! Events that can occur during a turn

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Validated inbound text, already trimmed and lowercased
    Inbound { text: String },

    /// The completion capability produced a reply
    CompletionReady { reply: String },

    /// The completion call (or prompt assembly around it) failed
    CompletionFailed { message: String },
}
