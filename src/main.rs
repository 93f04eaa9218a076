//! SMS gateway
//!
//! Receives carrier webhooks, tracks per-number opt-in state, and relays
//! conversations for subscribed numbers to a chat-completion model.

mod api;
mod config;
mod context;
mod db;
mod llm;
mod runtime;
mod sms;
mod state_machine;

use api::{create_router, AppState};
use config::GatewayConfig;
use db::Database;
use llm::{LlmService, LoggingService, OpenAIService};
use runtime::{ConversationController, DatabaseStorage, Storage};
use sms::{SmsSender, TwilioSender};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sms_gateway=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;
    let storage: Arc<dyn Storage> = Arc::new(DatabaseStorage::new(db));

    let openai = OpenAIService::new(
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm.base_url.as_deref(),
        config.llm.params,
    )?;
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(openai)));
    tracing::info!(model = %llm.model_id(), "Completion backend ready");

    let sms: Arc<dyn SmsSender> = Arc::new(TwilioSender::new(config.twilio.clone())?);

    let controller =
        ConversationController::new(storage, llm, sms, config.controller_settings());
    let app = create_router(AppState::new(controller)).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("SMS gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
