//! HTTP API for the SMS gateway
//!
//! The carrier posts inbound messages here; every accepted message is handed
//! to the conversation controller before the webhook is acknowledged.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::DynController;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DynController>,
}

impl AppState {
    pub fn new(controller: DynController) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }
}
