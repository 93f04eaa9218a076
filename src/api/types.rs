//! API request and response types

use serde::{Deserialize, Serialize};

/// Inbound message webhook, form-encoded in the carrier's field names.
/// Only `From` and `Body` are read; missing fields fail validation.
#[derive(Debug, Deserialize)]
pub struct InboundSmsRequest {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// Response for the liveness probe
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Response for the version endpoint
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
}
