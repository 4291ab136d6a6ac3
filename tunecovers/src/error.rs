//! Erreurs du cache de pochettes

use thiserror::Error;
use tunestore::StoreError;

#[derive(Debug, Error)]
pub enum CoverError {
    /// Source absente ou sans image embarquée
    #[error("No cover for {0}")]
    NotFound(String),

    /// Taille de variante hors de 16..=2048
    #[error("Invalid cover size: {0}")]
    InvalidSize(u32),

    #[error(transparent)]
    Store(StoreError),

    /// Décodage ou encodage de l'image impossible
    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record store error: {0}")]
    Backend(String),
}

impl From<StoreError> for CoverError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => CoverError::NotFound(name),
            other => CoverError::Store(other),
        }
    }
}

impl From<image::ImageError> for CoverError {
    fn from(err: image::ImageError) -> Self {
        CoverError::Image(err.to_string())
    }
}
