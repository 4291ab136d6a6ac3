use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tunecache::{AudioMetadata, MemoryRecordStore, MetadataError, MetadataExtractor, Picture};
use tunecovers::{CoverCache, CoverError};
use tunestore::{FsContentStore, cache_key};

fn png_bytes() -> Vec<u8> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, image::Rgb([200, 10, 10])))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    png
}

/// Extracteur espion : une pochette PNG pour les fichiers `with_cover*`
#[derive(Default)]
struct SpyExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl MetadataExtractor for SpyExtractor {
    async fn extract(&self, path: &Path) -> Result<AudioMetadata, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let picture = name.starts_with("with_cover").then(|| Picture {
            mime: "image/png".into(),
            data: png_bytes(),
        });
        Ok(AudioMetadata {
            picture,
            ..Default::default()
        })
    }
}

struct Fixture {
    _music: TempDir,
    covers: TempDir,
    spy: Arc<SpyExtractor>,
    cache: Arc<CoverCache>,
}

async fn fixture() -> Fixture {
    let music = TempDir::new().unwrap();
    std::fs::write(music.path().join("with_cover.mp3"), b"x").unwrap();
    std::fs::write(music.path().join("plain.mp3"), b"x").unwrap();
    let covers = TempDir::new().unwrap();

    let spy = Arc::new(SpyExtractor::default());
    let store = Arc::new(FsContentStore::new(music.path()).await.unwrap());
    let cache = CoverCache::new(
        covers.path(),
        store,
        spy.clone(),
        Arc::new(MemoryRecordStore::new()),
    )
    .await
    .unwrap();

    Fixture {
        _music: music,
        covers,
        spy,
        cache: Arc::new(cache),
    }
}

#[tokio::test]
async fn test_cover_is_extracted_once() {
    let f = fixture().await;

    let first = f.cache.get("with_cover.mp3").await.unwrap();
    let second = f.cache.get("with_cover.mp3").await.unwrap();

    assert_eq!(first.mime, "image/png");
    assert_eq!(first, second);
    assert_eq!(f.spy.calls.load(Ordering::SeqCst), 1);

    let key = cache_key("with_cover.mp3");
    assert!(f.covers.path().join(format!("{}.orig.img", key)).exists());
}

#[tokio::test]
async fn test_concurrent_misses_extract_once() {
    let f = fixture().await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = f.cache.clone();
            tokio::spawn(async move { cache.get("with_cover.mp3").await.unwrap() })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(f.spy.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_cover_and_missing_track() {
    let f = fixture().await;

    assert!(matches!(
        f.cache.get("plain.mp3").await,
        Err(CoverError::NotFound(_))
    ));
    assert!(matches!(
        f.cache.get("ghost.mp3").await,
        Err(CoverError::NotFound(_))
    ));
    assert!(matches!(
        f.cache.get("../secret.mp3").await,
        Err(CoverError::Store(_))
    ));
}

#[tokio::test]
async fn test_variant_generation() {
    let f = fixture().await;

    let webp = f.cache.get_variant("with_cover.mp3", 64).await.unwrap();
    assert_eq!(&webp[8..12], b"WEBP");

    let key = cache_key("with_cover.mp3");
    assert!(f.covers.path().join(format!("{}.64.webp", key)).exists());

    assert!(matches!(
        f.cache.get_variant("with_cover.mp3", 4).await,
        Err(CoverError::InvalidSize(4))
    ));
    assert!(matches!(
        f.cache.get_variant("with_cover.mp3", 4096).await,
        Err(CoverError::InvalidSize(4096))
    ));
}

#[tokio::test]
async fn test_invalidate_removes_files() {
    let f = fixture().await;

    f.cache.get_variant("with_cover.mp3", 32).await.unwrap();
    f.cache.invalidate("with_cover.mp3").await.unwrap();

    let key = cache_key("with_cover.mp3");
    let leftovers = std::fs::read_dir(f.covers.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with(&key)
        })
        .count();
    assert_eq!(leftovers, 0);

    // Nouvelle extraction après invalidation
    f.cache.get("with_cover.mp3").await.unwrap();
    assert_eq!(f.spy.calls.load(Ordering::SeqCst), 2);
}

#[cfg(feature = "server")]
mod http {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_cover_routes() {
        let f = fixture().await;
        let router = tunecovers::create_router(f.cache.clone());

        let ok = router
            .clone()
            .oneshot(Request::get("/api/cover/with_cover.mp3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[header::CONTENT_TYPE], "image/png");

        let missing = router
            .clone()
            .oneshot(Request::get("/api/cover/plain.mp3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let variant = router
            .clone()
            .oneshot(Request::get("/api/cover/with_cover.mp3/48").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(variant.status(), StatusCode::OK);
        assert_eq!(variant.headers()[header::CONTENT_TYPE], "image/webp");

        let bad_size = router
            .oneshot(Request::get("/api/cover/with_cover.mp3/huge").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(bad_size.status(), StatusCode::BAD_REQUEST);
    }
}
