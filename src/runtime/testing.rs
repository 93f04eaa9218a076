//! Mock implementations for testing
//!
//! These mocks enable integration testing of the controller without real I/O.

use super::traits::*;
use crate::db::{MessageRecord, Sender, SubscriberRecord};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::sms::{SmsError, SmsSender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock LLM
// ============================================================================

/// Mock LLM that returns queued responses
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::text(text)));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::transport("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock SMS Sender
// ============================================================================

/// Records every send; can be switched into failure mode
#[derive(Default)]
pub struct MockSmsSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl MockSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail.store(true, Ordering::SeqCst);
        sender
    }

    /// Bodies sent so far, in order
    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl SmsSender for MockSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SmsError::Rejected {
                status: 400,
                message: "mock failure".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// Which storage operations should fail
#[derive(Default)]
pub struct FailureFlags {
    pub subscriber_reads: AtomicBool,
    pub subscriber_writes: AtomicBool,
    pub message_writes: AtomicBool,
    pub message_reads: AtomicBool,
}

/// In-memory storage for testing
#[derive(Default)]
pub struct InMemoryStorage {
    subscribers: Mutex<HashMap<String, SubscriberRecord>>,
    /// Global append order; index breaks timestamp ties
    messages: Mutex<Vec<MessageRecord>>,
    next_msg_id: Mutex<u64>,
    /// Number of store calls of any kind
    calls: Mutex<usize>,
    pub fail: FailureFlags,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_call(&self) {
        *self.calls.lock().unwrap() += 1;
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Get all messages for an address, oldest first
    pub fn messages_for(&self, address: &str) -> Vec<MessageRecord> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.address == address)
            .cloned()
            .collect()
    }

    pub fn subscriber(&self, address: &str) -> Option<SubscriberRecord> {
        self.subscribers.lock().unwrap().get(address).cloned()
    }

    /// Seed a subscriber directly
    pub fn seed_subscriber(&self, address: &str, opted_in: bool) {
        let now = Utc::now();
        self.subscribers.lock().unwrap().insert(
            address.to_string(),
            SubscriberRecord {
                address: address.to_string(),
                opted_in,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Seed a log entry directly
    pub fn seed_message(&self, address: &str, body: &str, sender: Sender) {
        let mut id_guard = self.next_msg_id.lock().unwrap();
        let id = *id_guard;
        *id_guard += 1;
        drop(id_guard);

        self.messages.lock().unwrap().push(MessageRecord {
            message_id: format!("seed-{id}"),
            address: address.to_string(),
            body: body.to_string(),
            sender,
            received_at: Utc::now(),
        });
    }
}

#[async_trait]
impl SubscriberRegistry for InMemoryStorage {
    async fn get_subscriber(&self, address: &str) -> Result<Option<SubscriberRecord>, String> {
        self.record_call();
        if self.fail.subscriber_reads.load(Ordering::SeqCst) {
            return Err("mock subscriber read failure".to_string());
        }
        Ok(self.subscriber(address))
    }

    async fn register(&self, address: &str) -> Result<(), String> {
        self.record_call();
        if self.fail.subscriber_writes.load(Ordering::SeqCst) {
            return Err("mock subscriber write failure".to_string());
        }
        let now = Utc::now();
        self.subscribers
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert_with(|| SubscriberRecord {
                address: address.to_string(),
                opted_in: false,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn set_opted_in(&self, address: &str, opted_in: bool) -> Result<(), String> {
        self.record_call();
        if self.fail.subscriber_writes.load(Ordering::SeqCst) {
            return Err("mock subscriber write failure".to_string());
        }
        let now = Utc::now();
        self.subscribers
            .lock()
            .unwrap()
            .entry(address.to_string())
            .and_modify(|r| {
                r.opted_in = opted_in;
                r.updated_at = now;
            })
            .or_insert_with(|| SubscriberRecord {
                address: address.to_string(),
                opted_in,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStorage {
    async fn append(
        &self,
        address: &str,
        body: &str,
        sender: Sender,
        received_at: DateTime<Utc>,
    ) -> Result<MessageRecord, String> {
        self.record_call();
        if self.fail.message_writes.load(Ordering::SeqCst) {
            return Err("mock message write failure".to_string());
        }

        let mut id_guard = self.next_msg_id.lock().unwrap();
        let id = *id_guard;
        *id_guard += 1;
        drop(id_guard);

        let record = MessageRecord {
            message_id: format!("msg-{id}"),
            address: address.to_string(),
            body: body.to_string(),
            sender,
            received_at,
        };
        self.messages.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn recent(&self, address: &str, limit: usize) -> Result<Vec<MessageRecord>, String> {
        self.record_call();
        if self.fail.message_reads.load(Ordering::SeqCst) {
            return Err("mock message read failure".to_string());
        }

        let messages = self.messages.lock().unwrap();
        let mut matching: Vec<(usize, &MessageRecord)> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.address == address)
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| {
            b.received_at.cmp(&a.received_at).then_with(|| ib.cmp(ia))
        });
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SYSTEM_INSTRUCTION;
    use crate::llm::{LlmErrorKind, MessageRole, PromptMessage};
    use crate::runtime::{
        ControllerSettings, ConversationController, TurnOutcome, TurnReport, ValidationError,
    };
    use crate::state_machine::state::{GREETING, ONBOARDING_PROMPT};
    use crate::state_machine::TurnAction;
    use std::sync::Arc;

    const ADDR: &str = "+15550001111";

    struct Harness {
        storage: Arc<InMemoryStorage>,
        llm: Arc<MockLlm>,
        sms: Arc<MockSmsSender>,
        controller:
            ConversationController<Arc<InMemoryStorage>, Arc<MockLlm>, Arc<MockSmsSender>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_sms(MockSmsSender::new())
        }

        fn with_sms(sms: MockSmsSender) -> Self {
            Self::build(sms, ControllerSettings::default())
        }

        fn with_settings(settings: ControllerSettings) -> Self {
            Self::build(MockSmsSender::new(), settings)
        }

        fn build(sms: MockSmsSender, settings: ControllerSettings) -> Self {
            let storage = Arc::new(InMemoryStorage::new());
            let llm = Arc::new(MockLlm::new());
            let sms = Arc::new(sms);
            let controller = ConversationController::new(
                storage.clone(),
                llm.clone(),
                sms.clone(),
                settings,
            );
            Self {
                storage,
                llm,
                sms,
                controller,
            }
        }

        async fn send(&self, body: &str) -> TurnReport {
            self.controller.handle_inbound(ADDR, body).await.unwrap()
        }

        fn opted_in(&self) -> bool {
            self.storage.subscriber(ADDR).is_some_and(|r| r.opted_in)
        }
    }

    // ------------------------------------------------------------------
    // Doubles
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_mock_llm_drains_queue() {
        let mock = MockLlm::new();
        mock.queue_reply("Hello");

        let request = LlmRequest::new(vec![PromptMessage::user("hi")]);
        assert_eq!(mock.complete(&request).await.unwrap().text, "Hello");
        assert!(mock.complete(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_recent_returns_newest_first() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        for i in 0..5 {
            storage
                .append(ADDR, &format!("m{i}"), Sender::User, now)
                .await
                .unwrap();
        }

        let recent = storage.recent(ADDR, 3).await.unwrap();
        let bodies: Vec<_> = recent.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn test_unknown_address_is_not_opted_in() {
        let storage = InMemoryStorage::new();
        assert!(!storage.is_opted_in("+19999999999").await.unwrap());
    }

    // ------------------------------------------------------------------
    // Not subscribed
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_unsubscribed_hello_gets_onboarding() {
        let h = Harness::new();

        let report = h.send("hello").await;

        assert_eq!(report.action, Some(TurnAction::Onboarding));
        assert_eq!(report.outcome, TurnOutcome::Delivered);
        assert_eq!(h.sms.bodies(), vec![ONBOARDING_PROMPT.to_string()]);
        assert!(h.storage.messages_for(ADDR).is_empty());
        assert!(!h.opted_in());
        // First contact registers the address
        assert!(h.storage.subscriber(ADDR).is_some());
        assert!(h.llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_yeah_opts_in_without_logging() {
        let h = Harness::new();

        let report = h.send("  Yeah ").await;

        assert_eq!(report.action, Some(TurnAction::OptIn));
        assert_eq!(report.outcome, TurnOutcome::Delivered);
        assert!(h.opted_in());
        assert_eq!(h.sms.bodies(), vec![GREETING.to_string()]);
        assert!(h.storage.messages_for(ADDR).is_empty());
    }

    #[tokio::test]
    async fn test_opt_in_twice_greets_twice() {
        let h = Harness::new();

        h.send("YES").await;
        assert!(h.opted_in());
        h.send("YES").await;
        assert!(h.opted_in());

        assert_eq!(
            h.sms.bodies(),
            vec![GREETING.to_string(), GREETING.to_string()]
        );
        assert!(h.llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_stop_when_unsubscribed_is_silent() {
        let h = Harness::new();

        let report = h.send("STOP").await;

        assert_eq!(report.action, Some(TurnAction::OptOut));
        assert_eq!(report.outcome, TurnOutcome::Delivered);
        assert!(!h.opted_in());
        assert!(h.sms.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_stop_when_subscribed_opts_out() {
        let h = Harness::new();
        h.storage.seed_subscriber(ADDR, true);

        let report = h.send("stop").await;

        assert_eq!(report.action, Some(TurnAction::OptOut));
        assert!(!h.opted_in());
        assert!(h.storage.messages_for(ADDR).is_empty());
        assert!(h.llm.recorded_requests().is_empty());
    }

    // ------------------------------------------------------------------
    // Subscribed
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_subscribed_turn_with_history() {
        let h = Harness::new();
        h.storage.seed_subscriber(ADDR, true);
        h.storage.seed_message(ADDR, "hi", Sender::User);
        h.storage.seed_message(ADDR, "hello!", Sender::Assistant);
        h.llm.queue_reply("I'm doing well, thanks.");

        let report = h.send("How are you").await;

        assert_eq!(report.action, Some(TurnAction::Assistant));
        assert_eq!(report.outcome, TurnOutcome::Delivered);

        let requests = h.llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages,
            vec![
                PromptMessage::system(SYSTEM_INSTRUCTION),
                PromptMessage::user("hi"),
                PromptMessage::assistant("hello!"),
                PromptMessage::user("how are you"),
            ]
        );

        let log = h.storage.messages_for(ADDR);
        let entries: Vec<_> = log.iter().map(|m| (m.sender, m.body.as_str())).collect();
        assert_eq!(
            entries,
            vec![
                (Sender::User, "hi"),
                (Sender::Assistant, "hello!"),
                (Sender::User, "how are you"),
                (Sender::Assistant, "I'm doing well, thanks."),
            ]
        );
        assert_eq!(h.sms.bodies(), vec!["I'm doing well, thanks.".to_string()]);
    }

    #[tokio::test]
    async fn test_history_is_bounded_to_window() {
        let h = Harness::new();
        h.storage.seed_subscriber(ADDR, true);
        for i in 0..5 {
            h.storage.seed_message(ADDR, &format!("old {i}"), Sender::User);
        }
        h.llm.queue_reply("ok");

        h.send("latest").await;

        let messages = &h.llm.recorded_requests()[0].messages;
        assert_eq!(messages.len(), 5);
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![SYSTEM_INSTRUCTION, "old 2", "old 3", "old 4", "latest"]
        );
    }

    #[tokio::test]
    async fn test_unbounded_window_takes_all_history() {
        let h = Harness::with_settings(ControllerSettings {
            history_window: usize::MAX,
            ..ControllerSettings::default()
        });
        h.storage.seed_subscriber(ADDR, true);
        h.storage.seed_message(ADDR, "first", Sender::User);
        h.storage.seed_message(ADDR, "second", Sender::Assistant);
        h.llm.queue_reply("ok");

        let report = h.send("hello").await;

        assert_eq!(report.outcome, TurnOutcome::Delivered);
        let texts: Vec<_> = h.llm.recorded_requests()[0]
            .messages
            .iter()
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(texts, vec![SYSTEM_INSTRUCTION, "first", "second", "hello"]);
    }

    #[tokio::test]
    async fn test_opt_in_then_conversation() {
        let h = Harness::new();
        h.llm.queue_reply("There is a shelter on 5th street.");

        h.send("yes").await;
        let report = h.send("Where can I sleep tonight?").await;

        assert_eq!(report.outcome, TurnOutcome::Delivered);
        // The opt-in reply itself is never part of the log
        let log = h.storage.messages_for(ADDR);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].body, "where can i sleep tonight?");

        let prompt = &h.llm.recorded_requests()[0].messages;
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, MessageRole::System);
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_body_is_rejected_without_io() {
        let h = Harness::new();

        let result = h.controller.handle_inbound(ADDR, "   ").await;

        assert_eq!(result, Err(ValidationError::MissingBody));
        assert_eq!(h.storage.call_count(), 0);
        assert!(h.sms.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_missing_address_is_rejected() {
        let h = Harness::new();

        let result = h.controller.handle_inbound("", "hello").await;

        assert_eq!(result, Err(ValidationError::MissingAddress));
        assert_eq!(h.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_failure_drops_turn() {
        let h = Harness::new();
        h.storage.seed_subscriber(ADDR, true);
        h.llm.queue_error(LlmError::new(LlmErrorKind::Rejected, "overloaded"));

        let report = h.send("hello").await;

        assert!(matches!(report.outcome, TurnOutcome::Dropped { .. }));
        // User message was already logged; no reply logged or sent
        let log = h.storage.messages_for(ADDR);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::User);
        assert!(h.sms.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_after_reply_degrades() {
        let h = Harness::with_sms(MockSmsSender::failing());
        h.storage.seed_subscriber(ADDR, true);
        h.llm.queue_reply("reply");

        let report = h.send("hello").await;

        assert!(matches!(report.outcome, TurnOutcome::Degraded { .. }));
        assert_eq!(h.storage.messages_for(ADDR).len(), 2);
    }

    #[tokio::test]
    async fn test_onboarding_send_failure_drops() {
        let h = Harness::with_sms(MockSmsSender::failing());

        let report = h.send("hello").await;

        assert!(matches!(report.outcome, TurnOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn test_opt_in_write_failure_skips_greeting() {
        let h = Harness::new();
        h.storage.fail.subscriber_writes.store(true, Ordering::SeqCst);

        let report = h.send("yes").await;

        assert_eq!(report.action, Some(TurnAction::OptIn));
        assert!(matches!(report.outcome, TurnOutcome::Dropped { .. }));
        assert!(h.sms.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_registration_failure_still_onboards() {
        let h = Harness::new();
        h.storage.fail.subscriber_writes.store(true, Ordering::SeqCst);

        let report = h.send("hello").await;

        assert_eq!(report.action, Some(TurnAction::Onboarding));
        assert_eq!(report.outcome, TurnOutcome::Delivered);
        assert_eq!(h.sms.bodies(), vec![ONBOARDING_PROMPT.to_string()]);
        assert!(h.storage.subscriber(ADDR).is_none());
    }

    #[tokio::test]
    async fn test_subscriber_read_failure_drops_turn() {
        let h = Harness::new();
        h.storage.fail.subscriber_reads.store(true, Ordering::SeqCst);

        let report = h.send("hello").await;

        assert_eq!(report.action, None);
        assert!(matches!(report.outcome, TurnOutcome::Dropped { .. }));
        assert!(h.sms.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_history_read_failure_continues_with_empty_history() {
        let h = Harness::new();
        h.storage.seed_subscriber(ADDR, true);
        h.storage.seed_message(ADDR, "earlier", Sender::User);
        h.storage.fail.message_reads.store(true, Ordering::SeqCst);
        h.llm.queue_reply("reply");

        let report = h.send("hello").await;

        assert!(matches!(report.outcome, TurnOutcome::Degraded { .. }));
        assert_eq!(
            h.llm.recorded_requests()[0].messages,
            vec![
                PromptMessage::system(SYSTEM_INSTRUCTION),
                PromptMessage::user("hello"),
            ]
        );
        assert_eq!(h.sms.bodies(), vec!["reply".to_string()]);
    }

    #[tokio::test]
    async fn test_log_write_failure_still_replies() {
        let h = Harness::new();
        h.storage.seed_subscriber(ADDR, true);
        h.storage.fail.message_writes.store(true, Ordering::SeqCst);
        h.llm.queue_reply("reply");

        let report = h.send("hello").await;

        match report.outcome {
            TurnOutcome::Degraded { issues } => assert_eq!(issues.len(), 2),
            other => panic!("expected degraded, got {other:?}"),
        }
        assert_eq!(h.sms.bodies(), vec!["reply".to_string()]);
    }
}
