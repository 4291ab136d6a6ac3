//! Cache des métadonnées
//!
//! Un enregistrement est valide tant que le mtime du fichier source est égal
//! à celui mémorisé lors de l'extraction. Les enregistrements sont gardés en
//! mémoire et recopiés de façon asynchrone dans un [`RecordStore`] par une
//! tâche d'écriture unique, dans l'ordre des mutations.

use crate::db::RecordStore;
use crate::error::MetadataError;
use crate::locks::KeyedLocks;
use crate::metadata::MetadataExtractor;
use crate::track::{mtime_millis, TrackRecord};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tunestore::ContentStore;

enum WriteOp {
    Put(String, String),
    Delete(String),
    Flush(oneshot::Sender<()>),
}

/// Cache des métadonnées de pistes, clé = nom de fichier
pub struct MetadataCache {
    store: Arc<dyn ContentStore>,
    extractor: Arc<dyn MetadataExtractor>,
    records: RwLock<HashMap<String, TrackRecord>>,
    locks: KeyedLocks,
    writer: mpsc::UnboundedSender<WriteOp>,
}

impl MetadataCache {
    /// Crée le cache et recharge les enregistrements persistés
    ///
    /// Doit être appelé depuis un runtime tokio : la tâche d'écriture y est
    /// lancée.
    pub fn new(
        store: Arc<dyn ContentStore>,
        extractor: Arc<dyn MetadataExtractor>,
        backend: Arc<dyn RecordStore>,
    ) -> Result<Self, MetadataError> {
        let mut records = HashMap::new();
        let rows = backend
            .all()
            .map_err(|e| MetadataError::Backend(e.to_string()))?;
        for (key, json) in rows {
            match serde_json::from_str::<TrackRecord>(&json) {
                Ok(record) => {
                    records.insert(key, record);
                }
                Err(e) => warn!(key = %key, error = %e, "Dropping unreadable metadata record"),
            }
        }
        info!(count = records.len(), "Metadata cache loaded");

        let (writer, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_back(backend, queue));

        Ok(Self {
            store,
            extractor,
            records: RwLock::new(records),
            locks: KeyedLocks::new(),
            writer,
        })
    }

    fn cached(&self, name: &str, mtime_ms: i64) -> Option<TrackRecord> {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        records
            .get(name)
            .filter(|record| record.mtime_at_scan == mtime_ms)
            .cloned()
    }

    /// Enregistrement de `name`, ré-extrait si le mtime du fichier a changé
    /// depuis la dernière extraction.
    ///
    /// Un échec d'analyse n'est pas une erreur : un enregistrement de repli,
    /// titré d'après le nom du fichier, est mis en cache à la place.
    pub async fn get(&self, name: &str) -> Result<TrackRecord, MetadataError> {
        let stat = self.store.stat(name).await?;
        let mtime_ms = mtime_millis(stat.mtime);

        if let Some(record) = self.cached(name, mtime_ms) {
            return Ok(record);
        }

        let _guard = self.locks.lock(name).await;

        // Un autre appelant a pu rafraîchir l'entrée pendant l'attente
        let stat = self.store.stat(name).await?;
        let mtime_ms = mtime_millis(stat.mtime);
        if let Some(record) = self.cached(name, mtime_ms) {
            return Ok(record);
        }

        let path = self.store.local_path(name)?;
        let record = match self.extractor.extract(&path).await {
            Ok(metadata) => TrackRecord::from_metadata(name, mtime_ms, metadata),
            Err(e) => {
                warn!(name, error = %e, "Metadata extraction failed, using file name");
                TrackRecord::fallback(name, mtime_ms)
            }
        };
        debug!(name, mtime_ms, has_cover = record.has_cover, "Metadata extracted");

        self.records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name.to_string(), record.clone());
        self.persist(name, &record);

        Ok(record)
    }

    /// Retire l'entrée de `name` (fichier source supprimé)
    pub async fn invalidate(&self, name: &str) {
        let _guard = self.locks.lock(name).await;
        let removed = self
            .records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name)
            .is_some();
        let _ = self.writer.send(WriteOp::Delete(name.to_string()));
        debug!(name, removed, "Metadata entry invalidated");
    }

    /// Retire les entrées dont le fichier source n'existe plus
    pub async fn consolidate(&self) -> usize {
        let names: Vec<String> = self
            .records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();

        let mut removed = 0;
        for name in names {
            if !self.store.exists(&name).await {
                self.invalidate(&name).await;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Metadata cache consolidated");
        }
        removed
    }

    /// Entrée en cache, sans vérifier le fichier source
    pub fn peek(&self, name: &str) -> Option<TrackRecord> {
        self.records
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attend que toutes les écritures en file aient atteint le `RecordStore`
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(WriteOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn persist(&self, name: &str, record: &TrackRecord) {
        match serde_json::to_string(record) {
            Ok(json) => {
                let _ = self.writer.send(WriteOp::Put(name.to_string(), json));
            }
            Err(e) => warn!(name, error = %e, "Cannot serialize metadata record"),
        }
    }
}

async fn write_back(backend: Arc<dyn RecordStore>, mut queue: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = queue.recv().await {
        let backend = backend.clone();
        let result = match op {
            WriteOp::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            WriteOp::Put(key, json) => {
                tokio::task::spawn_blocking(move || backend.put(&key, &json)).await
            }
            WriteOp::Delete(key) => tokio::task::spawn_blocking(move || backend.delete(&key)).await,
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Metadata write-back failed"),
            Err(e) => warn!(error = %e, "Metadata write-back task panicked"),
        }
    }
    debug!("Metadata write-back stopped");
}
