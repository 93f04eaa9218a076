//! Process configuration, read once from the environment at startup

use crate::context::{HISTORY_WINDOW, SYSTEM_INSTRUCTION};
use crate::llm::{SamplingParams, DEFAULT_MODEL};
use crate::runtime::ControllerSettings;
use crate::sms::{TwilioConfig, DEFAULT_API_BASE};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;

/// Upper bound on prompt history, keeps prompts within model context
const MAX_HISTORY_WINDOW: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Completion backend settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub params: SamplingParams,
}

/// Everything the gateway needs to start
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub db_path: String,
    pub port: u16,
    pub twilio: TwilioConfig,
    pub llm: LlmConfig,
    pub history_window: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let db_path = get("SMS_GATEWAY_DB_PATH").unwrap_or_else(|| {
            let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.sms-gateway/gateway.db")
        });

        let port = parse_or("SMS_GATEWAY_PORT", get("SMS_GATEWAY_PORT"), DEFAULT_PORT)?;
        let history_window = parse_or(
            "SMS_GATEWAY_HISTORY_WINDOW",
            get("SMS_GATEWAY_HISTORY_WINDOW"),
            HISTORY_WINDOW,
        )?;
        if history_window > MAX_HISTORY_WINDOW {
            return Err(ConfigError::Invalid {
                name: "SMS_GATEWAY_HISTORY_WINDOW",
                value: history_window.to_string(),
            });
        }

        let twilio = TwilioConfig {
            account_sid: require("TWILIO_ACCOUNT_SID")?,
            auth_token: require("TWILIO_AUTH_TOKEN")?,
            from_number: require("TWILIO_PHONE_NUMBER")?,
            api_base: get("TWILIO_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        };

        let llm = LlmConfig {
            api_key: require("OPENAI_API_KEY")?,
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("OPENAI_BASE_URL"),
            params: SamplingParams::default(),
        };

        Ok(Self {
            db_path,
            port,
            twilio,
            llm,
            history_window,
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history_window: self.history_window,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}
