use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tunehls::{
    Artifact, ArtifactStore, EncodeHandle, EncodeOutcome, EncodeRequest, Encoder, HlsError,
    HlsManager, JobState, ProgressReporter,
};
use tunestore::{FsContentStore, cache_key};

const MANIFEST: &str = "#EXTM3U\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:10.0,\nsegments/segment_00000.ts\n#EXT-X-ENDLIST\n";

/// Encodeur espion : compte les lancements et attend un feu vert pour finir
struct SpyEncoder {
    launches: AtomicUsize,
    gate: Arc<Semaphore>,
    refuse_launch: AtomicBool,
    fail_next: AtomicBool,
}

impl SpyEncoder {
    fn new() -> Self {
        Self {
            launches: AtomicUsize::new(0),
            gate: Arc::new(Semaphore::new(0)),
            refuse_launch: AtomicBool::new(false),
            fail_next: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }

    fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Encoder for SpyEncoder {
    fn launch(
        &self,
        request: EncodeRequest,
        progress: ProgressReporter,
    ) -> Result<EncodeHandle, HlsError> {
        if self.refuse_launch.load(Ordering::SeqCst) {
            return Err(HlsError::Launch("spy refused".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        progress.report(10.0);

        let fail = self.fail_next.swap(false, Ordering::SeqCst);
        let gate = self.gate.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let completion = tokio::spawn(async move {
            // Le répertoire a pu être supprimé par une invalidation
            let _ = std::fs::write(request.output_dir.join("segment_00000.ts"), b"0123456789");
            let _ = std::fs::write(&request.partial_manifest, MANIFEST);

            tokio::select! {
                _ = token.cancelled() => return EncodeOutcome::Cancelled,
                permit = gate.acquire_owned() => permit.unwrap().forget(),
            }

            if fail {
                return EncodeOutcome::Failure {
                    detail: "spy failure".into(),
                };
            }
            match std::fs::rename(&request.partial_manifest, &request.manifest) {
                Ok(()) => EncodeOutcome::Success,
                Err(e) => EncodeOutcome::Failure {
                    detail: e.to_string(),
                },
            }
        });

        Ok(EncodeHandle { completion, cancel })
    }
}

struct Fixture {
    music: TempDir,
    hls: TempDir,
    spy: Arc<SpyEncoder>,
    manager: Arc<HlsManager>,
}

async fn manager_over(music: &TempDir, hls: &TempDir, spy: Arc<SpyEncoder>) -> Arc<HlsManager> {
    let store = Arc::new(FsContentStore::new(music.path()).await.unwrap());
    let artifacts = ArtifactStore::new(hls.path()).await.unwrap();
    Arc::new(HlsManager::new(store, artifacts, spy))
}

async fn fixture() -> Fixture {
    let music = TempDir::new().unwrap();
    std::fs::write(music.path().join("song.flac"), b"fLaC").unwrap();
    let hls = TempDir::new().unwrap();
    let spy = Arc::new(SpyEncoder::new());
    let manager = manager_over(&music, &hls, spy.clone()).await;
    Fixture {
        music,
        hls,
        spy,
        manager,
    }
}

async fn wait_idle(manager: &HlsManager) {
    for _ in 0..300 {
        if manager.active_jobs() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("transcode still running");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_launch_once() {
    let f = fixture().await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let manager = f.manager.clone();
            tokio::spawn(async move { manager.request_artifact("song.flac").await.unwrap() })
        })
        .collect();
    for task in tasks {
        assert!(matches!(task.await.unwrap(), Artifact::Transcoding { .. }));
    }
    assert_eq!(f.spy.launches(), 1);

    let status = f.manager.poll_status("song.flac").await;
    assert_eq!(status.state, JobState::Transcoding);
    assert_eq!(status.progress, 10);

    f.spy.release();
    wait_idle(&f.manager).await;

    let artifact = f.manager.request_artifact("song.flac").await.unwrap();
    assert!(matches!(artifact, Artifact::Ready { .. }));
    let status = f.manager.poll_status("song.flac").await;
    assert_eq!(status.state, JobState::Done);
    assert_eq!(status.progress, 100);
    assert_eq!(f.spy.launches(), 1);
}

#[tokio::test]
async fn test_completed_artifact_survives_restart() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();
    f.spy.release();
    wait_idle(&f.manager).await;

    let fresh_spy = Arc::new(SpyEncoder::new());
    let restarted = manager_over(&f.music, &f.hls, fresh_spy.clone()).await;
    assert_eq!(restarted.consolidate().await.unwrap(), 0);

    let artifact = restarted.request_artifact("song.flac").await.unwrap();
    assert!(matches!(artifact, Artifact::Ready { .. }));
    assert_eq!(fresh_spy.launches(), 0);
    assert!(restarted.manifest("song.flac").await.unwrap().starts_with("#EXTM3U"));
}

#[tokio::test]
async fn test_missing_source() {
    let f = fixture().await;

    let err = f.manager.request_artifact("ghost.flac").await.unwrap_err();
    assert!(err.is_not_found());

    let status = f.manager.poll_status("ghost.flac").await;
    assert_eq!(status.state, JobState::Pending);
    assert_eq!(f.spy.launches(), 0);
}

#[tokio::test]
async fn test_failure_cleans_up_and_allows_retry() {
    let f = fixture().await;
    f.spy.fail_next.store(true, Ordering::SeqCst);

    f.manager.request_artifact("song.flac").await.unwrap();
    f.spy.release();
    wait_idle(&f.manager).await;

    let status = f.manager.poll_status("song.flac").await;
    assert_eq!(status.state, JobState::Error);
    assert_eq!(status.error_detail.as_deref(), Some("spy failure"));
    assert!(!f.hls.path().join(cache_key("song.flac")).exists());

    // Relance à la demande du client
    let artifact = f.manager.request_artifact("song.flac").await.unwrap();
    assert!(matches!(artifact, Artifact::Transcoding { .. }));
    assert_eq!(f.spy.launches(), 2);
    assert_eq!(
        f.manager.poll_status("song.flac").await.state,
        JobState::Transcoding
    );

    f.spy.release();
    wait_idle(&f.manager).await;
    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Done);
}

#[tokio::test]
async fn test_launch_failure_is_reported() {
    let f = fixture().await;
    f.spy.refuse_launch.store(true, Ordering::SeqCst);

    let err = f.manager.request_artifact("song.flac").await.unwrap_err();
    assert!(matches!(err, HlsError::Launch(_)));
    assert_eq!(f.manager.active_jobs(), 0);

    let status = f.manager.poll_status("song.flac").await;
    assert_eq!(status.state, JobState::Error);
    assert!(!f.hls.path().join(cache_key("song.flac")).exists());
}

#[tokio::test]
async fn test_deletion_invalidates_everything() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();
    assert_eq!(f.manager.active_jobs(), 1);

    std::fs::remove_file(f.music.path().join("song.flac")).unwrap();
    f.manager.invalidate("song.flac").await.unwrap();

    assert_eq!(f.manager.active_jobs(), 0);
    assert!(!f.hls.path().join(cache_key("song.flac")).exists());
    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Pending);

    // La complétion de la tâche annulée ne recrée rien
    f.spy.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Pending);
}

#[tokio::test]
async fn test_invalidate_completed_artifact() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();
    f.spy.release();
    wait_idle(&f.manager).await;

    std::fs::remove_file(f.music.path().join("song.flac")).unwrap();
    f.manager.invalidate("song.flac").await.unwrap();

    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Pending);
    assert!(f.manager.request_artifact("song.flac").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_segments() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();
    f.spy.release();
    wait_idle(&f.manager).await;

    let segment = f
        .manager
        .fetch_segment("song.flac", "segment_00000.ts")
        .await
        .unwrap();
    assert_eq!(segment.size, 10);

    assert!(matches!(
        f.manager.fetch_segment("song.flac", "../../etc/passwd").await,
        Err(HlsError::InvalidSegment(_))
    ));
    assert!(
        f.manager
            .fetch_segment("song.flac", "segment_00009.ts")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn test_segments_hidden_while_transcoding() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();

    // Le segment est déjà sur le disque, le manifeste pas encore
    for _ in 0..100 {
        if f.hls.path().join(cache_key("song.flac")).join("segment_00000.ts").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Transcoding);
    assert!(
        f.manager
            .fetch_segment("song.flac", "segment_00000.ts")
            .await
            .unwrap_err()
            .is_not_found()
    );

    f.spy.release();
    wait_idle(&f.manager).await;
    assert!(f.manager.fetch_segment("song.flac", "segment_00000.ts").await.is_ok());
}

#[tokio::test]
async fn test_completed_artifact_without_source_is_not_found() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();
    f.spy.release();
    wait_idle(&f.manager).await;

    // Source retirée sans invalidation : l'artefact reste sur le disque
    std::fs::remove_file(f.music.path().join("song.flac")).unwrap();
    assert!(f.hls.path().join(cache_key("song.flac")).join("index.m3u8").exists());

    assert!(f.manager.request_artifact("song.flac").await.unwrap_err().is_not_found());
    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Pending);
    assert!(
        f.manager
            .fetch_segment("song.flac", "segment_00000.ts")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn test_running_job_hidden_once_source_removed() {
    let f = fixture().await;
    f.manager.request_artifact("song.flac").await.unwrap();
    assert_eq!(f.manager.active_jobs(), 1);

    // Fenêtre entre la suppression du fichier et l'invalidation
    std::fs::remove_file(f.music.path().join("song.flac")).unwrap();

    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Pending);
    assert!(f.manager.request_artifact("song.flac").await.unwrap_err().is_not_found());
    assert_eq!(f.spy.launches(), 1);

    f.manager.invalidate("song.flac").await.unwrap();
    f.spy.release();
    wait_idle(&f.manager).await;
    assert_eq!(f.manager.poll_status("song.flac").await.state, JobState::Pending);
}
