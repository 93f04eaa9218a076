//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the controller with in-memory implementations.

use crate::db::{Database, MessageRecord, Sender, SubscriberRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Keyed opt-in records, one per address
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Look up the record for an address. Absence is not an error.
    async fn get_subscriber(&self, address: &str) -> Result<Option<SubscriberRecord>, String>;

    /// Create a not-opted-in record if none exists; never overwrites
    async fn register(&self, address: &str) -> Result<(), String>;

    /// Upsert the opt-in flag without touching other fields
    async fn set_opted_in(&self, address: &str, opted_in: bool) -> Result<(), String>;

    /// Opt-in status, with a missing record reading as `false`
    #[allow(dead_code)] // API completeness
    async fn is_opted_in(&self, address: &str) -> Result<bool, String> {
        Ok(self
            .get_subscriber(address)
            .await?
            .is_some_and(|record| record.opted_in))
    }
}

/// Append-only message log keyed by address
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to the address's log
    async fn append(
        &self,
        address: &str,
        body: &str,
        sender: Sender,
        received_at: DateTime<Utc>,
    ) -> Result<MessageRecord, String>;

    /// Up to `limit` records for the address, newest first
    async fn recent(&self, address: &str, limit: usize) -> Result<Vec<MessageRecord>, String>;
}

/// Combined storage trait for convenience
pub trait Storage: SubscriberRegistry + MessageStore {}
impl<T: SubscriberRegistry + MessageStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SubscriberRegistry + ?Sized> SubscriberRegistry for Arc<T> {
    async fn get_subscriber(&self, address: &str) -> Result<Option<SubscriberRecord>, String> {
        (**self).get_subscriber(address).await
    }

    async fn register(&self, address: &str) -> Result<(), String> {
        (**self).register(address).await
    }

    async fn set_opted_in(&self, address: &str, opted_in: bool) -> Result<(), String> {
        (**self).set_opted_in(address, opted_in).await
    }
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn append(
        &self,
        address: &str,
        body: &str,
        sender: Sender,
        received_at: DateTime<Utc>,
    ) -> Result<MessageRecord, String> {
        (**self).append(address, body, sender, received_at).await
    }

    async fn recent(&self, address: &str, limit: usize) -> Result<Vec<MessageRecord>, String> {
        (**self).recent(address, limit).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriberRegistry for DatabaseStorage {
    async fn get_subscriber(&self, address: &str) -> Result<Option<SubscriberRecord>, String> {
        self.db.get_subscriber(address).map_err(|e| e.to_string())
    }

    async fn register(&self, address: &str) -> Result<(), String> {
        let created = self
            .db
            .register_subscriber(address)
            .map_err(|e| e.to_string())?;
        if created {
            tracing::debug!(address, "Registered new subscriber");
        }
        Ok(())
    }

    async fn set_opted_in(&self, address: &str, opted_in: bool) -> Result<(), String> {
        self.db
            .set_opted_in(address, opted_in)
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn append(
        &self,
        address: &str,
        body: &str,
        sender: Sender,
        received_at: DateTime<Utc>,
    ) -> Result<MessageRecord, String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .add_message(&id, address, body, sender, received_at)
            .map_err(|e| e.to_string())
    }

    async fn recent(&self, address: &str, limit: usize) -> Result<Vec<MessageRecord>, String> {
        self.db
            .recent_messages(address, limit)
            .map_err(|e| e.to_string())
    }
}
