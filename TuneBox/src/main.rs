use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tunecache::{DB, LoftyExtractor, MetadataCache, MetadataExtractor};
use tunecovers::{CoversConfigExt, CoversExt};
use tunehls::{DurationHint, HlsConfigExt, HlsExt};
use tunelibrary::{Library, LibraryExt, PasswordVerifier};
use tuneserver::{Server, logs::LoggingOptions};
use tunestore::{ContentStore, FsContentStore, PlaylistOrderStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========

    let config = tuneconfig::get_config();
    let mut server = Server::new_configured();
    server.init_logging(LoggingOptions::from_config()).await;

    let music_dir = config.get_music_dir()?;
    info!(directory = %music_dir, "🎵 Opening music library");
    let store: Arc<dyn ContentStore> = Arc::new(FsContentStore::new(&music_dir).await?);
    let extractor: Arc<dyn MetadataExtractor> = Arc::new(LoftyExtractor);

    // ========== PHASE 2 : Caches ==========

    let metadata_dir = config.get_metadata_cache_dir()?;
    let metadata_db = DB::init(&Path::new(&metadata_dir).join("metadata.db"), "track_records")?;
    let metadata = Arc::new(MetadataCache::new(
        store.clone(),
        extractor.clone(),
        Arc::new(metadata_db),
    )?);
    let stale = metadata.consolidate().await;
    info!(records = metadata.len(), stale, "✅ Metadata cache ready");

    let covers = config
        .create_cover_cache(store.clone(), extractor.clone())
        .await?;

    let durations: Arc<dyn DurationHint> = metadata.clone();
    let hls = config
        .create_hls_manager(store.clone(), Some(durations))
        .await?;

    // ========== PHASE 3 : Routes ==========

    let chunk_size = config.get_chunk_size()? as u64;
    let library = Library::new(
        store,
        metadata.clone(),
        covers.clone(),
        hls.clone(),
        PlaylistOrderStore::new(config.get_playlist_file()),
        PasswordVerifier::from_config(),
    )
    .with_chunk_size(chunk_size);

    server.register_covers(covers).await;
    server.register_hls(hls, chunk_size).await;
    server.register_library(Arc::new(library)).await;

    match config.get_webapp_dir() {
        Some(dir) => server.add_static_dir(dir),
        None => warn!("No web client directory configured, serving the API only"),
    }

    // ========== PHASE 4 : Démarrage ==========

    info!("🌐 Starting HTTP server...");
    server.start().await?;
    info!("✅ TuneBox is ready! Press Ctrl+C to stop...");
    server.wait().await;

    metadata.flush().await;
    info!("TuneBox stopped");
    Ok(())
}
