//! Erreurs de l'extraction et du cache des métadonnées

use thiserror::Error;
use tunestore::StoreError;

#[derive(Debug, Error)]
pub enum MetadataError {
    /// Le fichier source n'existe pas
    #[error("Track not found: {0}")]
    NotFound(String),

    /// L'outil d'extraction n'a pas pu lire le fichier
    #[error("Metadata parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Échec du `RecordStore` (SQLite)
    #[error("Record store error: {0}")]
    Backend(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MetadataError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => MetadataError::NotFound(name),
            other => MetadataError::Store(other),
        }
    }
}
