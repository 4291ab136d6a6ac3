//! Orchestrateur des transcodages HLS
//!
//! Une seule tâche par fichier source : la vérification « une tâche
//! existe-t-elle ? » et la création se font sous le même verrou, sans point
//! de suspension entre les deux. Les tâches terminées sont retirées de la
//! table dès que le manifeste est sur le disque.

use crate::artifact::ArtifactStore;
use crate::encoder::{EncodeOutcome, EncodeRequest, Encoder};
use crate::error::HlsError;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tunecache::MetadataCache;
use tunestore::{ContentStore, cache_key, validate_name};

/// Préfixe des segments dans le manifeste, relatif à `.../playlist.m3u8`
pub const SEGMENT_URL_PREFIX: &str = "segments/";

/// État d'un transcodage vu par les clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Transcoding,
    Done,
    Error,
}

/// Réponse de `pollStatus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            progress: 0,
            error_detail: None,
        }
    }

    pub fn transcoding(progress: u8) -> Self {
        Self {
            state: JobState::Transcoding,
            progress,
            error_detail: None,
        }
    }

    pub fn done() -> Self {
        Self {
            state: JobState::Done,
            progress: 100,
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            state: JobState::Error,
            progress: 0,
            error_detail: Some(detail.into()),
        }
    }
}

/// Réponse de `request_artifact`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Manifeste complet sur le disque
    Ready { manifest: PathBuf },
    /// Transcodage en cours, réessayer plus tard
    Transcoding { progress: u8 },
}

/// Fournit la durée d'une piste pour estimer la progression
#[async_trait]
pub trait DurationHint: Send + Sync {
    async fn duration_secs(&self, name: &str) -> Option<f64>;
}

#[async_trait]
impl DurationHint for MetadataCache {
    async fn duration_secs(&self, name: &str) -> Option<f64> {
        self.get(name)
            .await
            .ok()
            .and_then(|record| record.details)
            .and_then(|details| details.duration_secs)
            .filter(|d| *d > 0.0)
    }
}

/// Tâche de transcodage en cours
#[derive(Debug)]
struct Job {
    key: String,
    progress: ProgressReporter,
    cancel: CancellationToken,
}

enum Launch {
    /// Tâche existante ou artefact terminé entre-temps
    Joined(Artifact),
    Started {
        job: Arc<Job>,
        completion: JoinHandle<EncodeOutcome>,
    },
    Failed(HlsError),
}

type JobMap = Arc<Mutex<HashMap<String, Arc<Job>>>>;
type FailureMap = Arc<Mutex<HashMap<String, String>>>;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Orchestrateur : une tâche au plus par fichier source
pub struct HlsManager {
    store: Arc<dyn ContentStore>,
    artifacts: Arc<ArtifactStore>,
    encoder: Arc<dyn Encoder>,
    durations: Option<Arc<dyn DurationHint>>,
    jobs: JobMap,
    /// Dernier échec par fichier, effacé au prochain lancement
    failures: FailureMap,
}

impl HlsManager {
    pub fn new(
        store: Arc<dyn ContentStore>,
        artifacts: ArtifactStore,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        Self {
            store,
            artifacts: Arc::new(artifacts),
            encoder,
            durations: None,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Utilise `durations` pour estimer la progression
    pub fn with_duration_hint(mut self, durations: Arc<dyn DurationHint>) -> Self {
        self.durations = Some(durations);
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Nombre de transcodages en cours
    pub fn active_jobs(&self) -> usize {
        locked(&self.jobs).len()
    }

    /// Supprime les artefacts incomplets laissés par un arrêt brutal
    pub async fn consolidate(&self) -> Result<usize, HlsError> {
        self.artifacts.consolidate().await
    }

    /// Manifeste de `name`, en lançant le transcodage si nécessaire
    ///
    /// - source absente : `NotFound`, même si un artefact ou une tâche existe
    /// - artefact présent : `Ready`, sans consulter la table des tâches
    /// - tâche en cours : `Transcoding` avec sa progression
    /// - sinon : lance une tâche et renvoie `Transcoding { progress: 0 }`
    pub async fn request_artifact(&self, name: &str) -> Result<Artifact, HlsError> {
        validate_name(name)?;
        let key = cache_key(name);

        if !self.store.exists(name).await {
            return Err(HlsError::NotFound(name.to_string()));
        }

        if self.artifacts.manifest_exists(&key).await {
            return Ok(Artifact::Ready {
                manifest: self.artifacts.manifest_path(&key),
            });
        }

        if let Some(job) = locked(&self.jobs).get(name) {
            return Ok(Artifact::Transcoding {
                progress: job.progress.get(),
            });
        }

        let duration_hint = match &self.durations {
            Some(durations) => durations.duration_secs(name).await,
            None => None,
        };
        let output_dir = self.artifacts.prepare(&key).await?;
        let input = self.store.local_path(name)?;

        let request = EncodeRequest {
            name: name.to_string(),
            input,
            output_dir,
            partial_manifest: self.artifacts.partial_manifest_path(&key),
            manifest: self.artifacts.manifest_path(&key),
            segment_pattern: self.artifacts.segment_pattern(&key),
            url_prefix: SEGMENT_URL_PREFIX.to_string(),
            duration_hint,
        };

        let (job, completion) = match self.launch_once(name, &key, request) {
            Launch::Joined(artifact) => return Ok(artifact),
            Launch::Started { job, completion } => (job, completion),
            Launch::Failed(e) => {
                error!(name, error = %e, "Cannot start transcode");
                return Err(e);
            }
        };

        info!(name, hint = ?duration_hint, "Transcode started");

        let jobs = self.jobs.clone();
        let failures = self.failures.clone();
        let artifacts = self.artifacts.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let outcome = match completion.await {
                Ok(outcome) => outcome,
                Err(e) => EncodeOutcome::Failure {
                    detail: format!("encoder task failed: {}", e),
                },
            };
            finish_job(&jobs, &failures, &artifacts, &name, &job, outcome).await;
        });

        Ok(Artifact::Transcoding { progress: 0 })
    }

    /// Section critique : vérifie puis crée la tâche sous le même verrou
    fn launch_once(&self, name: &str, key: &str, request: EncodeRequest) -> Launch {
        let mut jobs = locked(&self.jobs);

        if let Some(job) = jobs.get(name) {
            return Launch::Joined(Artifact::Transcoding {
                progress: job.progress.get(),
            });
        }
        // Une tâche a pu se terminer pendant les suspensions précédentes
        if self.artifacts.manifest_exists_now(key) {
            return Launch::Joined(Artifact::Ready {
                manifest: self.artifacts.manifest_path(key),
            });
        }

        let progress = ProgressReporter::new();
        let handle = match self.encoder.launch(request, progress.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                // Répertoire encore vide, retiré tant que le verrou est tenu
                if let Err(dir_err) = std::fs::remove_dir(self.artifacts.dir(key)) {
                    if dir_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(name, error = %dir_err, "Cannot remove empty artifact directory");
                    }
                }
                locked(&self.failures).insert(name.to_string(), e.to_string());
                return Launch::Failed(e);
            }
        };
        locked(&self.failures).remove(name);

        let job = Arc::new(Job {
            key: key.to_string(),
            progress,
            cancel: handle.cancel,
        });
        jobs.insert(name.to_string(), job.clone());

        Launch::Started {
            job,
            completion: handle.completion,
        }
    }

    /// État courant de `name` ; ne lance ni ne modifie aucune tâche
    ///
    /// Sans fichier source, toujours `Pending` : une tâche qui tourne encore
    /// après la suppression n'est jamais visible.
    pub async fn poll_status(&self, name: &str) -> JobStatus {
        if !self.store.exists(name).await {
            return JobStatus::pending();
        }
        if let Some(job) = locked(&self.jobs).get(name) {
            return JobStatus::transcoding(job.progress.get());
        }
        if let Some(detail) = locked(&self.failures).get(name) {
            return JobStatus::error(detail.clone());
        }
        if self.artifacts.manifest_exists(&cache_key(name)).await {
            return JobStatus::done();
        }
        JobStatus::pending()
    }

    /// Contenu du manifeste s'il est complet
    pub async fn manifest(&self, name: &str) -> Result<String, HlsError> {
        validate_name(name)?;
        self.artifacts.read_manifest(&cache_key(name)).await
    }

    /// Chemin et taille d'un segment d'un artefact terminé
    ///
    /// `segment` est validé avant tout accès au disque. Les segments d'un
    /// transcodage en cours ne sont pas servis.
    pub async fn fetch_segment(&self, name: &str, segment: &str) -> Result<SegmentFile, HlsError> {
        crate::segment::validate_segment_id(segment)?;
        validate_name(name)?;
        let key = cache_key(name);
        if !self.store.exists(name).await || !self.artifacts.manifest_exists(&key).await {
            return Err(HlsError::NotFound(format!("{}/{}", name, segment)));
        }
        let size = self.artifacts.segment_size(&key, segment).await?;
        Ok(SegmentFile {
            key,
            segment: segment.to_string(),
            size,
        })
    }

    /// Oublie tout ce qui concerne `name` (fichier source supprimé)
    ///
    /// Annule la tâche en cours, efface l'échec mémorisé et supprime le
    /// répertoire de l'artefact.
    pub async fn invalidate(&self, name: &str) -> Result<(), HlsError> {
        let job = locked(&self.jobs).remove(name);
        locked(&self.failures).remove(name);

        if let Some(job) = &job {
            job.cancel.cancel();
            debug!(name, "Cancelled running transcode");
        }

        let key = job.map(|j| j.key.clone()).unwrap_or_else(|| cache_key(name));
        self.artifacts.remove(&key).await?;
        info!(name, "HLS state invalidated");
        Ok(())
    }
}

/// Segment prêt à être servi
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub key: String,
    pub segment: String,
    pub size: u64,
}

fn is_current(jobs: &JobMap, name: &str, job: &Arc<Job>) -> bool {
    locked(jobs)
        .get(name)
        .is_some_and(|current| Arc::ptr_eq(current, job))
}

async fn finish_job(
    jobs: &JobMap,
    failures: &FailureMap,
    artifacts: &ArtifactStore,
    name: &str,
    job: &Arc<Job>,
    outcome: EncodeOutcome,
) {
    // Tâche annulée ou remplacée : `invalidate` a déjà tout nettoyé
    if !is_current(jobs, name, job) {
        debug!(name, ?outcome, "Ignoring completion of a stale transcode");
        return;
    }

    let detail = match outcome {
        EncodeOutcome::Success if artifacts.manifest_exists(&job.key).await => {
            let mut map = locked(jobs);
            if map.get(name).is_some_and(|current| Arc::ptr_eq(current, job)) {
                map.remove(name);
            }
            info!(name, "Transcode done");
            return;
        }
        EncodeOutcome::Success => "encoder reported success but no manifest was written".to_string(),
        EncodeOutcome::Failure { detail } => detail,
        EncodeOutcome::Cancelled => "transcode cancelled".to_string(),
    };

    warn!(name, detail = %detail, "Transcode failed");

    // L'entrée reste en place pendant le nettoyage : aucune relance ne peut
    // écrire dans le répertoire en cours de suppression.
    if let Err(e) = artifacts.remove(&job.key).await {
        warn!(name, error = %e, "Cannot remove partial artifact");
    }

    let mut map = locked(jobs);
    if map.get(name).is_some_and(|current| Arc::ptr_eq(current, job)) {
        map.remove(name);
        locked(failures).insert(name.to_string(), detail);
    }
}
