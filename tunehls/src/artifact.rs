//! Stockage durable des artefacts HLS
//!
//! ```text
//! cache_hls/
//! └── 3f2a…c1/                 # tunestore::cache_key(nom du fichier)
//!     ├── index.m3u8           # présent = transcodage terminé
//!     ├── index.m3u8.part      # manifeste en cours d'écriture
//!     └── segment_00000.ts
//! ```
//!
//! La présence du manifeste est la seule preuve qu'un transcodage est
//! terminé ; l'orchestrateur ne fait que coordonner les tâches en cours.

use crate::error::HlsError;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use tunestore::{ByteStream, StoreError};

pub const MANIFEST_NAME: &str = "index.m3u8";
pub const PARTIAL_MANIFEST_NAME: &str = "index.m3u8.part";
/// Motif ffmpeg des segments
pub const SEGMENT_PATTERN: &str = "segment_%05d.ts";

/// Répertoire racine des artefacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Crée le stockage, en créant `root` si besoin
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, HlsError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!(directory = %root.display(), "HLS artifact store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn manifest_path(&self, key: &str) -> PathBuf {
        self.dir(key).join(MANIFEST_NAME)
    }

    pub fn partial_manifest_path(&self, key: &str) -> PathBuf {
        self.dir(key).join(PARTIAL_MANIFEST_NAME)
    }

    pub fn segment_pattern(&self, key: &str) -> PathBuf {
        self.dir(key).join(SEGMENT_PATTERN)
    }

    /// `segment` doit avoir été validé
    pub fn segment_path(&self, key: &str, segment: &str) -> PathBuf {
        self.dir(key).join(segment)
    }

    pub async fn manifest_exists(&self, key: &str) -> bool {
        fs::metadata(self.manifest_path(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Variante synchrone, utilisable sous le verrou de la table des tâches
    pub fn manifest_exists_now(&self, key: &str) -> bool {
        self.manifest_path(key).is_file()
    }

    /// Crée le répertoire de l'artefact
    pub async fn prepare(&self, key: &str) -> Result<PathBuf, HlsError> {
        let dir = self.dir(key);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Supprime le répertoire de l'artefact (absent = succès)
    pub async fn remove(&self, key: &str) -> Result<(), HlsError> {
        match fs::remove_dir_all(self.dir(key)).await {
            Ok(()) => {
                debug!(key, "Removed HLS artifact directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_manifest(&self, key: &str) -> Result<String, HlsError> {
        match fs::read_to_string(self.manifest_path(key)).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(HlsError::NotFound(format!("manifest {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Taille d'un segment ; `segment` doit avoir été validé
    pub async fn segment_size(&self, key: &str, segment: &str) -> Result<u64, HlsError> {
        match fs::metadata(self.segment_path(key, segment)).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(HlsError::NotFound(segment.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(HlsError::NotFound(segment.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ouvre la plage inclusive `start..=end` d'un segment
    pub async fn open_segment(
        &self,
        key: &str,
        segment: &str,
        start: u64,
        end: u64,
    ) -> Result<ByteStream, StoreError> {
        let path = self.segment_path(key, segment);
        let mut file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(segment.to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        if start > 0 {
            file.seek(io::SeekFrom::Start(start)).await?;
        }
        let len = end.saturating_sub(start) + 1;
        Ok(Box::pin(ReaderStream::new(file.take(len))))
    }

    /// Supprime les répertoires sans manifeste (transcodages interrompus)
    ///
    /// Appelé au démarrage, avant toute requête.
    pub async fn consolidate(&self) -> Result<usize, HlsError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().to_string();
            if self.manifest_exists(&key).await {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Cannot remove partial HLS artifact"),
            }
        }

        if removed > 0 {
            info!(removed, "Removed partial HLS artifacts");
        }
        Ok(removed)
    }
}
