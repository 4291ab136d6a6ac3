//! Cover Cache
//!
//! La pochette originale est extraite une seule fois du fichier audio et
//! conservée dans `{key}.orig.img`, son type MIME dans la table SQLite.
//! Les vignettes WebP `{key}.{size}.webp` sont générées à la demande.
//! Aucune invalidation par mtime : seule la suppression de la piste efface
//! l'entrée.

use crate::error::CoverError;
use crate::webp::render_variant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use tunecache::{KeyedLocks, MetadataExtractor, RecordStore};
use tunestore::{ContentStore, cache_key, validate_name};

/// Tailles de vignettes acceptées
pub const MIN_VARIANT_SIZE: u32 = 16;
pub const MAX_VARIANT_SIZE: u32 = 2048;

/// Image servie par le cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Enregistrement SQLite d'une pochette
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CoverRecord {
    name: String,
    mime: String,
    size: usize,
}

/// Cache des pochettes, clé = nom de fichier
pub struct CoverCache {
    dir: PathBuf,
    store: Arc<dyn ContentStore>,
    extractor: Arc<dyn MetadataExtractor>,
    db: Arc<dyn RecordStore>,
    locks: KeyedLocks,
}

impl CoverCache {
    /// Crée le cache dans `dir` (créé si besoin)
    pub async fn new(
        dir: impl Into<PathBuf>,
        store: Arc<dyn ContentStore>,
        extractor: Arc<dyn MetadataExtractor>,
        db: Arc<dyn RecordStore>,
    ) -> Result<Self, CoverError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!(directory = %dir.display(), "Cover cache ready");
        Ok(Self {
            dir,
            store,
            extractor,
            db,
            locks: KeyedLocks::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str, qualifier: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.{}", key, qualifier, ext))
    }

    fn original_path(&self, key: &str) -> PathBuf {
        self.file_path(key, "orig", "img")
    }

    fn variant_path(&self, key: &str, size: u32) -> PathBuf {
        self.file_path(key, &size.to_string(), "webp")
    }

    async fn db_get(&self, key: &str) -> Result<Option<CoverRecord>, CoverError> {
        let db = self.db.clone();
        let key = key.to_string();
        let json = tokio::task::spawn_blocking(move || db.get(&key))
            .await
            .map_err(|e| CoverError::Backend(e.to_string()))?
            .map_err(|e| CoverError::Backend(e.to_string()))?;
        Ok(json.and_then(|j| serde_json::from_str(&j).ok()))
    }

    async fn db_run<F>(&self, op: F) -> Result<(), CoverError>
    where
        F: FnOnce(&dyn RecordStore) -> anyhow::Result<()> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(db.as_ref()))
            .await
            .map_err(|e| CoverError::Backend(e.to_string()))?
            .map_err(|e| CoverError::Backend(e.to_string()))
    }

    async fn read_cached(&self, key: &str) -> Result<Option<Cover>, CoverError> {
        let Some(record) = self.db_get(key).await? else {
            return Ok(None);
        };
        match fs::read(self.original_path(key)).await {
            Ok(data) => Ok(Some(Cover {
                mime: record.mime,
                data,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Pochette originale de `name`
    ///
    /// Cherche d'abord dans le cache ; sinon l'extrait du fichier audio, la
    /// persiste et la retourne. `NotFound` si la piste n'existe pas ou n'a
    /// pas d'image.
    pub async fn get(&self, name: &str) -> Result<Cover, CoverError> {
        validate_name(name)?;
        let key = cache_key(name);

        if let Some(cover) = self.read_cached(&key).await? {
            return Ok(cover);
        }

        let _guard = self.locks.lock(&key).await;
        if let Some(cover) = self.read_cached(&key).await? {
            return Ok(cover);
        }

        if !self.store.exists(name).await {
            return Err(CoverError::NotFound(name.to_string()));
        }

        let path = self.store.local_path(name)?;
        let picture = match self.extractor.extract(&path).await {
            Ok(metadata) => metadata.picture,
            Err(e) => {
                warn!(name, error = %e, "Cannot read cover from audio file");
                None
            }
        };
        let Some(picture) = picture else {
            return Err(CoverError::NotFound(name.to_string()));
        };

        write_atomic(&self.original_path(&key), &picture.data).await?;

        let record = CoverRecord {
            name: name.to_string(),
            mime: picture.mime.clone(),
            size: picture.data.len(),
        };
        let json = serde_json::to_string(&record).map_err(|e| CoverError::Backend(e.to_string()))?;
        let db_key = key.clone();
        self.db_run(move |db| db.put(&db_key, &json)).await?;

        debug!(name, key = %key, mime = %picture.mime, "Cover extracted");
        Ok(Cover {
            mime: picture.mime,
            data: picture.data,
        })
    }

    /// Vignette WebP carrée de `name`, générée au premier appel
    pub async fn get_variant(&self, name: &str, size: u32) -> Result<Vec<u8>, CoverError> {
        if !(MIN_VARIANT_SIZE..=MAX_VARIANT_SIZE).contains(&size) {
            return Err(CoverError::InvalidSize(size));
        }
        validate_name(name)?;
        let key = cache_key(name);
        let variant_path = self.variant_path(&key, size);

        if let Ok(data) = fs::read(&variant_path).await {
            return Ok(data);
        }

        let original = self.get(name).await?;

        let _guard = self.locks.lock(&key).await;
        if let Ok(data) = fs::read(&variant_path).await {
            return Ok(data);
        }

        let webp = tokio::task::spawn_blocking(move || render_variant(&original.data, size))
            .await
            .map_err(|e| CoverError::Image(e.to_string()))??;

        write_atomic(&variant_path, &webp).await?;
        debug!(name, size, "Cover variant generated");
        Ok(webp)
    }

    /// Supprime la pochette et ses vignettes (piste supprimée)
    pub async fn invalidate(&self, name: &str) -> Result<(), CoverError> {
        let key = cache_key(name);
        let _guard = self.locks.lock(&key).await;

        let db_key = key.clone();
        self.db_run(move |db| db.delete(&db_key)).await?;

        let prefix = format!("{}.", key);
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        debug!(name, removed, "Cover cache entry invalidated");
        Ok(())
    }
}

/// Écrit `data` dans un fichier temporaire puis le renomme
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CoverError> {
    let tmp = path.with_extension("tmp");
    if let Err(e) = fs::write(&tmp, data).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}
