use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::database::StorageError;
use crate::modules::migration::crud::{format_instant, ChatStore, LegacyChatFetcher};
use crate::modules::migration::schema::{ExportPayload, ExportSource, StatusResponse};
use crate::services::auth::OwnerId;
use crate::services::normalize::{CanonicalNormalizer, ChatTransform, Passthrough};

pub const EXPORT_FORMAT: &str = "app-message-export";
pub const EXPORT_VERSION: u32 = 1;
pub const SOURCE_APP: &str = "deni-ai";
pub const SOURCE_CHANNEL: &str = "master";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        match self {
            ExportError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(StatusResponse::error("Unauthorized")),
            )
                .into_response(),
            other => {
                tracing::error!(error = %other, "export failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(StatusResponse::error("Export failed")),
                )
                    .into_response()
            }
        }
    }
}

pub fn build_export_payload<T>(chats: Vec<T>) -> ExportPayload<T> {
    build_export_payload_at(chats, Utc::now())
}

/// Wraps `chats` untouched. Only `exported_at` depends on anything but input.
pub fn build_export_payload_at<T>(chats: Vec<T>, exported_at: DateTime<Utc>) -> ExportPayload<T> {
    ExportPayload {
        format: EXPORT_FORMAT.to_string(),
        version: EXPORT_VERSION,
        exported_at: format_instant(exported_at),
        source: ExportSource {
            app: SOURCE_APP.to_string(),
            channel: SOURCE_CHANNEL.to_string(),
        },
        chats,
    }
}

/// Fetch, optionally normalize, then wrap one owner's chats.
#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn ChatStore>,
    query_timeout: Duration,
    normalize: bool,
}

impl ExportService {
    pub fn new(store: Arc<dyn ChatStore>, query_timeout: Duration, normalize: bool) -> Self {
        Self {
            store,
            query_timeout,
            normalize,
        }
    }

    pub async fn export<S: ChatTransform>(
        &self,
        owner: &OwnerId,
        stage: &S,
    ) -> Result<ExportPayload<S::Output>, ExportError> {
        let fetcher = LegacyChatFetcher::new(self.store.clone(), self.query_timeout);
        let chats = fetcher.fetch(owner).await?;
        tracing::info!(owner = %owner, chats = chats.len(), "exporting chats");

        Ok(build_export_payload(stage.apply(chats)))
    }

    /// Runs the configured pipeline and renders the document as pretty JSON.
    pub async fn export_document(&self, owner: &OwnerId) -> Result<String, ExportError> {
        if self.normalize {
            render(&self.export(owner, &CanonicalNormalizer).await?)
        } else {
            render(&self.export(owner, &Passthrough).await?)
        }
    }
}

fn render<T: Serialize>(payload: &ExportPayload<T>) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(payload)?)
}
