use serde::{Deserialize, Serialize};

use crate::modules::migration::model::LegacyChatSession;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExportSource {
    pub app: String,
    pub channel: String,
}

/// The export document. `T` is the chat shape the pipeline produced.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload<T = LegacyChatSession> {
    pub format: String,
    pub version: u32,
    pub exported_at: String,
    pub source: ExportSource,
    pub chats: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
