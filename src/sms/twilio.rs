//! Twilio Programmable Messaging sender

use super::{SmsError, SmsSender};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Longest body the carrier accepts in one message
pub const MAX_BODY_CHARS: usize = 1600;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials and sender number for the Twilio account
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

pub struct TwilioSender {
    client: Client,
    config: TwilioConfig,
}

impl TwilioSender {
    pub fn new(config: TwilioConfig) -> Result<Self, SmsError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SmsError::Other(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    async fn send_segment(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| SmsError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TwilioErrorResponse>(&text)
            .map_or(text, |err| match err.code {
                Some(code) => format!("{} (code {code})", err.message),
                None => err.message,
            });
        Err(SmsError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let segments = split_body(body, MAX_BODY_CHARS);
        let count = segments.len();
        for (i, segment) in segments.iter().enumerate() {
            self.send_segment(to, segment).await?;
            tracing::debug!(to, segment = i + 1, of = count, "SMS segment sent");
        }
        Ok(())
    }
}

/// Split a body into pieces of at most `max_chars` characters
fn split_body(body: &str, max_chars: usize) -> Vec<String> {
    if body.chars().count() <= max_chars {
        return vec![body.to_string()];
    }

    let chars: Vec<char> = body.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[derive(Debug, Deserialize)]
struct TwilioErrorResponse {
    #[serde(default)]
    code: Option<u64>,
    message: String,
}
