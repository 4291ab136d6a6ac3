//! Façade de la bibliothèque musicale
//!
//! Réunit le stockage des fichiers, les caches et l'orchestrateur HLS pour
//! les opérations exposées par l'API : listing ordonné, informations
//! détaillées, upload et suppression.

use crate::error::LibraryError;
use crate::password::PasswordVerifier;
use crate::track::{TrackInfo, TrackSummary};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};
use tunecache::{MetadataCache, TrackRecord, mtime_millis};
use tunecovers::CoverCache;
use tunehls::HlsManager;
use tunestore::{
    ByteStream, ContentStore, FileStat, PlaylistOrderStore, StagedFile, order_tracks,
    validate_name,
};

/// Taille par défaut des réponses à plage ouverte (1 Mio)
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

pub struct Library {
    store: Arc<dyn ContentStore>,
    metadata: Arc<MetadataCache>,
    covers: Arc<CoverCache>,
    hls: Arc<HlsManager>,
    playlist: PlaylistOrderStore,
    password: PasswordVerifier,
    chunk_size: u64,
}

impl Library {
    pub fn new(
        store: Arc<dyn ContentStore>,
        metadata: Arc<MetadataCache>,
        covers: Arc<CoverCache>,
        hls: Arc<HlsManager>,
        playlist: PlaylistOrderStore,
        password: PasswordVerifier,
    ) -> Self {
        Self {
            store,
            metadata,
            covers,
            hls,
            playlist,
            password,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn check_password(&self, candidate: &str) -> bool {
        self.password.check(candidate)
    }

    /// Pistes dans l'ordre de la playlist, nouveaux fichiers en tête
    pub async fn tracks(&self) -> Result<Vec<TrackSummary>, LibraryError> {
        let files = self.store.list().await?;
        let order = self.playlist.load().await;
        let files = order_tracks(files, &order);

        let summaries = join_all(files.into_iter().map(|file| async move {
            match self.metadata.get(&file.name).await {
                Ok(record) => TrackSummary::from(record),
                Err(e) => {
                    warn!(name = %file.name, error = %e, "Using fallback track record");
                    TrackSummary::from(TrackRecord::fallback(&file.name, mtime_millis(file.mtime)))
                }
            }
        }))
        .await;

        Ok(summaries)
    }

    /// Informations détaillées d'une piste
    pub async fn track_info(&self, name: &str) -> Result<TrackInfo, LibraryError> {
        let stat = self.store.stat(name).await?;
        let record = self.metadata.get(name).await?;
        Ok(TrackInfo::new(&record, stat.size))
    }

    /// Enregistre l'ordre de la playlist
    pub async fn save_order(&self, order: &[String]) -> Result<(), LibraryError> {
        self.playlist.save(order).await?;
        info!(tracks = order.len(), "Playlist order saved");
        Ok(())
    }

    /// Enregistre un fichier envoyé par un client
    ///
    /// Un fichier remplacé perd sa pochette et son artefact HLS.
    pub async fn add_track(&self, name: &str, data: ByteStream) -> Result<FileStat, LibraryError> {
        let staged = self.stage_track(name, data).await?;
        self.commit_track(staged).await
    }

    /// Reçoit un fichier à l'écart de la bibliothèque
    ///
    /// Rien n'est visible ni remplacé avant [`Library::commit_track`].
    pub async fn stage_track(&self, name: &str, data: ByteStream) -> Result<StagedFile, LibraryError> {
        validate_name(name)?;
        if !tunestore::is_audio_file(name) {
            return Err(LibraryError::BadRequest(format!(
                "Unsupported file type: {}",
                name
            )));
        }
        Ok(self.store.stage(name, data).await?)
    }

    /// Publie un fichier reçu, en remplaçant la piste du même nom
    pub async fn commit_track(&self, staged: StagedFile) -> Result<FileStat, LibraryError> {
        let name = staged.name().to_string();
        let replaced = self.store.exists(&name).await;
        let stat = self.store.commit(staged).await?;
        if replaced {
            self.forget(&name).await;
        }
        info!(name, size = stat.size, replaced, "Track added");
        Ok(stat)
    }

    /// Abandonne un fichier reçu sans toucher à la bibliothèque
    pub async fn discard_track(&self, staged: StagedFile) {
        self.store.discard(staged).await;
    }

    /// Supprime une piste et tout ce qui en dérive
    pub async fn delete_track(&self, name: &str) -> Result<(), LibraryError> {
        self.store.delete(name).await?;
        self.forget(name).await;
        info!(name, "Track deleted");
        Ok(())
    }

    /// Invalide HLS, métadonnées et pochette de `name`
    ///
    /// L'artefact HLS passe en premier : sa tâche de transcodage est annulée
    /// avant les attentes sur les autres caches.
    async fn forget(&self, name: &str) {
        if let Err(e) = self.hls.invalidate(name).await {
            warn!(name, error = %e, "Cannot invalidate HLS artifact");
        }
        self.metadata.invalidate(name).await;
        if let Err(e) = self.covers.invalidate(name).await {
            warn!(name, error = %e, "Cannot invalidate cover cache");
        }
    }
}
