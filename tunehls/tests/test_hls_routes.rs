#![cfg(feature = "server")]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tunehls::{
    ArtifactStore, EncodeHandle, EncodeOutcome, EncodeRequest, Encoder, HlsError, HlsManager,
    JobState, JobStatus, ProgressReporter, create_router,
};
use tunestore::FsContentStore;

/// Encodeur instantané : écrit un segment et le manifeste
struct InstantEncoder;

impl Encoder for InstantEncoder {
    fn launch(
        &self,
        request: EncodeRequest,
        _progress: ProgressReporter,
    ) -> Result<EncodeHandle, HlsError> {
        let completion = tokio::spawn(async move {
            std::fs::write(request.output_dir.join("segment_00000.ts"), b"0123456789").unwrap();
            std::fs::write(
                &request.manifest,
                "#EXTM3U\n#EXTINF:10.0,\nsegments/segment_00000.ts\n#EXT-X-ENDLIST\n",
            )
            .unwrap();
            EncodeOutcome::Success
        });
        Ok(EncodeHandle {
            completion,
            cancel: CancellationToken::new(),
        })
    }
}

async fn setup() -> (TempDir, TempDir, Arc<HlsManager>, axum::Router) {
    let music = TempDir::new().unwrap();
    std::fs::write(music.path().join("song.ogg"), b"OggS").unwrap();
    let hls = TempDir::new().unwrap();

    let store = Arc::new(FsContentStore::new(music.path()).await.unwrap());
    let artifacts = ArtifactStore::new(hls.path()).await.unwrap();
    let manager = Arc::new(HlsManager::new(store, artifacts, Arc::new(InstantEncoder)));
    let router = create_router(manager.clone(), 4);
    (music, hls, manager, router)
}

async fn get(router: &axum::Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_status(response: axum::response::Response) -> JobStatus {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_playlist_lifecycle() {
    let (_music, _hls, manager, router) = setup().await;

    let status = json_status(get(&router, "/api/hls/song.ogg/status").await).await;
    assert_eq!(status.state, JobState::Pending);

    let accepted = get(&router, "/api/hls/song.ogg/playlist.m3u8").await;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    assert_eq!(json_status(accepted).await.state, JobState::Transcoding);

    for _ in 0..100 {
        if manager.active_jobs() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let ready = get(&router, "/api/hls/song.ogg/playlist.m3u8").await;
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(
        ready.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );
    let body = to_bytes(ready.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("segments/segment_00000.ts"));

    let done = json_status(get(&router, "/api/hls/song.ogg/status").await).await;
    assert_eq!(done.state, JobState::Done);
    assert_eq!(done.progress, 100);

    let segment = get(&router, "/api/hls/song.ogg/segments/segment_00000.ts").await;
    assert_eq!(segment.status(), StatusCode::OK);
    assert_eq!(segment.headers()[header::ACCEPT_RANGES], "bytes");

    let partial = router
        .clone()
        .oneshot(
            Request::get("/api/hls/song.ogg/segments/segment_00000.ts")
                .header(header::RANGE, "bytes=2-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(partial.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(partial.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
}

#[tokio::test]
async fn test_missing_and_invalid_requests() {
    let (_music, _hls, _manager, router) = setup().await;

    let missing = get(&router, "/api/hls/ghost.ogg/playlist.m3u8").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let traversal = get(&router, "/api/hls/song.ogg/segments/..%2F..%2Fetc%2Fpasswd").await;
    assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);

    let manifest_as_segment = get(&router, "/api/hls/song.ogg/segments/index.m3u8").await;
    assert_eq!(manifest_as_segment.status(), StatusCode::BAD_REQUEST);

    let absent_segment = get(&router, "/api/hls/song.ogg/segments/segment_00001.ts").await;
    assert_eq!(absent_segment.status(), StatusCode::NOT_FOUND);
}
