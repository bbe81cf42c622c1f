use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::modules::migration::schema::HealthResponse;
use crate::services::auth::OwnerId;
use crate::services::export::ExportError;
use crate::AppState;

const EXPORT_DISPOSITION: &str = "attachment; filename=\"message.json\"";

/// The caller's identity, resolved before the handler body runs.
pub struct AuthenticatedUser(pub OwnerId);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ExportError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.sessions.resolve(&parts.headers).await? {
            Some(owner) => Ok(AuthenticatedUser(owner)),
            None => {
                tracing::debug!(path = %parts.uri.path(), "rejecting unauthenticated export");
                Err(ExportError::Unauthorized)
            }
        }
    }
}

pub async fn export_messages(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
) -> Result<Response, ExportError> {
    let document = state.export.export_document(&owner).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, EXPORT_DISPOSITION),
        ],
        document,
    )
        .into_response())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
