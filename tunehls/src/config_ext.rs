//! Extension pour intégrer l'orchestrateur HLS dans tuneconfig
//!
//! ```yaml
//! host:
//!   hls:
//!     directory: cache_hls
//!     ffmpeg: ffmpeg
//!     segment_seconds: 10
//!     audio_bitrate: 192k
//! ```

use crate::{ArtifactStore, DurationHint, FfmpegEncoder, HlsManager};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tuneconfig::Config;
use tunestore::ContentStore;

const DEFAULT_HLS_DIR: &str = "cache_hls";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_SEGMENT_SECONDS: u32 = 10;
const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Trait d'extension de `tuneconfig::Config` pour HLS
pub trait HlsConfigExt {
    /// Répertoire des artefacts (créé si besoin)
    fn get_hls_dir(&self) -> Result<String>;

    fn set_hls_dir(&self, directory: String) -> Result<()>;

    /// Binaire ffmpeg (nom dans le PATH ou chemin)
    fn get_ffmpeg_binary(&self) -> String;

    fn get_hls_segment_seconds(&self) -> u32;

    fn get_hls_audio_bitrate(&self) -> String;

    /// Encodeur ffmpeg configuré
    fn create_ffmpeg_encoder(&self) -> FfmpegEncoder;

    /// Orchestrateur configuré ; les artefacts incomplets sont supprimés
    async fn create_hls_manager(
        &self,
        store: Arc<dyn ContentStore>,
        durations: Option<Arc<dyn DurationHint>>,
    ) -> Result<Arc<HlsManager>>;
}

impl HlsConfigExt for Config {
    fn get_hls_dir(&self) -> Result<String> {
        self.get_managed_dir(&["host", "hls", "directory"], DEFAULT_HLS_DIR)
    }

    fn set_hls_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["host", "hls", "directory"], directory)
    }

    fn get_ffmpeg_binary(&self) -> String {
        self.get_string(&["host", "hls", "ffmpeg"], DEFAULT_FFMPEG)
    }

    fn get_hls_segment_seconds(&self) -> u32 {
        self.get_string(&["host", "hls", "segment_seconds"], "")
            .trim()
            .parse()
            .ok()
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_SEGMENT_SECONDS)
    }

    fn get_hls_audio_bitrate(&self) -> String {
        self.get_string(&["host", "hls", "audio_bitrate"], DEFAULT_AUDIO_BITRATE)
    }

    fn create_ffmpeg_encoder(&self) -> FfmpegEncoder {
        FfmpegEncoder::new(
            self.get_ffmpeg_binary(),
            self.get_hls_segment_seconds(),
            self.get_hls_audio_bitrate(),
        )
    }

    async fn create_hls_manager(
        &self,
        store: Arc<dyn ContentStore>,
        durations: Option<Arc<dyn DurationHint>>,
    ) -> Result<Arc<HlsManager>> {
        let artifacts = ArtifactStore::new(self.get_hls_dir()?).await?;
        let encoder = Arc::new(self.create_ffmpeg_encoder());
        let mut manager = HlsManager::new(store, artifacts, encoder);
        if let Some(durations) = durations {
            manager = manager.with_duration_hint(durations);
        }

        let removed = manager.consolidate().await?;
        info!(removed, "HLS manager ready");
        Ok(Arc::new(manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_from_embedded_config() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_config(tmp.path().to_str().unwrap()).unwrap();

        assert_eq!(config.get_ffmpeg_binary(), "ffmpeg");
        assert_eq!(config.get_hls_segment_seconds(), 10);
        assert_eq!(config.get_hls_audio_bitrate(), "192k");
        let dir = config.get_hls_dir().unwrap();
        assert!(std::path::Path::new(&dir).is_dir());
    }
}
