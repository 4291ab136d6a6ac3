//! Corps JSON des réponses d'erreur, partagé par toutes les API

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Réponse d'erreur standard `{ "error": CODE, "message": ... }`
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Code d'erreur stable (ex: `NOT_FOUND`, `INVALID_SEGMENT`)
    #[schema(example = "NOT_FOUND")]
    pub error: String,
    /// Message lisible
    #[schema(example = "File not found: song.flac")]
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    /// Réponse HTTP avec le statut donné
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Raccourci pour `ErrorResponse::new(code, message).into_response_with(status)`
pub fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    ErrorResponse::new(error, message).into_response_with(status)
}
