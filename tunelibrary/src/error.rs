//! Erreurs de la bibliothèque et leur traduction HTTP

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;
use tunecache::MetadataError;
use tunecovers::CoverError;
use tunehls::HlsError;
use tunestore::StoreError;
use tuneserver::error_response;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("File not found: {0}")]
    NotFound(String),

    /// Mot de passe absent ou incorrect
    #[error("Wrong password")]
    Unauthorized,

    /// Requête invalide (nom de fichier, type de fichier, format JSON...)
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Metadata(MetadataError),

    #[error(transparent)]
    Cover(#[from] CoverError),

    #[error(transparent)]
    Hls(#[from] HlsError),
}

impl From<StoreError> for LibraryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => LibraryError::NotFound(name),
            StoreError::InvalidName(name) => {
                LibraryError::BadRequest(format!("Invalid file name: {}", name))
            }
            other => LibraryError::Store(other),
        }
    }
}

impl From<MetadataError> for LibraryError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(name) => LibraryError::NotFound(name),
            MetadataError::Store(e) => e.into(),
            other => LibraryError::Metadata(other),
        }
    }
}

impl IntoResponse for LibraryError {
    fn into_response(self) -> Response {
        match &self {
            LibraryError::NotFound(_) => {
                error_response(StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string())
            }
            LibraryError::Unauthorized => {
                error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string())
            }
            LibraryError::BadRequest(_) => {
                warn!(error = %self, "Rejected request");
                error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string())
            }
            _ => {
                warn!(error = %self, "Library request failed");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    self.to_string(),
                )
            }
        }
    }
}
