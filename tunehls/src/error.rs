//! Erreurs de l'orchestrateur HLS

use thiserror::Error;
use tunestore::StoreError;

#[derive(Debug, Error)]
pub enum HlsError {
    /// Fichier source ou artefact absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifiant de segment refusé (traversée de chemin, extension...)
    #[error("Invalid segment id: {0}")]
    InvalidSegment(String),

    /// L'encodeur n'a pas pu être lancé
    #[error("Cannot launch encoder: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for HlsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => HlsError::NotFound(name),
            other => HlsError::Store(other),
        }
    }
}

impl HlsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HlsError::NotFound(_))
    }
}
