//! Outbound SMS transport
//!
//! The gateway treats the carrier as a plain "send text to address"
//! capability.

mod twilio;

pub use twilio::{TwilioConfig, TwilioSender, DEFAULT_API_BASE};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SmsError {
    #[error("SMS request failed: {0}")]
    Network(String),
    #[error("Carrier rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("SMS transport error: {0}")]
    Other(String),
}

/// Capability to deliver a text message to an address
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

#[async_trait]
impl<T: SmsSender + ?Sized> SmsSender for Arc<T> {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        (**self).send(to, body).await
    }
}
