//! Module de gestion des métadonnées audio
//!
//! [`MetadataExtractor`] est le point d'extension vers l'outil d'analyse ;
//! [`LoftyExtractor`] lit les tags et les propriétés avec `lofty`.

use crate::error::MetadataError;
use async_trait::async_trait;
use lofty::config::ParseOptions;
use lofty::file::TaggedFile;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Image embarquée dans un fichier audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// Type MIME déclaré par le tag (`image/jpeg` par défaut)
    pub mime: String,
    pub data: Vec<u8>,
}

/// Métadonnées d'une piste audio
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    #[cfg_attr(feature = "openapi", schema(example = "Wish You Were Here"))]
    pub title: Option<String>,
    #[cfg_attr(feature = "openapi", schema(example = "Pink Floyd"))]
    pub artist: Option<String>,
    pub album: Option<String>,
    #[cfg_attr(feature = "openapi", schema(example = 1975))]
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub composer: Option<String>,
    pub comment: Option<String>,

    /// Durée en secondes
    #[cfg_attr(feature = "openapi", schema(example = 334.5))]
    pub duration_secs: Option<f64>,
    /// Bitrate moyen (kbps)
    pub bitrate: Option<u32>,
    /// Taux d'échantillonnage (Hz)
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bits_per_sample: Option<u8>,
    /// Codec audio (ex: `MPEG-1 Layer 3`, `FLAC`)
    pub codec: Option<String>,
    /// Conteneur (ex: `Mpeg`, `Flac`, `Mp4`)
    pub container: Option<String>,

    /// Pochette, jamais sérialisée avec l'enregistrement
    #[serde(skip)]
    #[cfg_attr(feature = "openapi", schema(ignore))]
    pub picture: Option<Picture>,
}

impl AudioMetadata {
    pub fn has_picture(&self) -> bool {
        self.picture.is_some()
    }

    fn from_tagged_file(tagged_file: &TaggedFile) -> Self {
        let properties = tagged_file.properties();
        let file_type = tagged_file.file_type();
        let duration = properties.duration();

        let mut metadata = Self {
            duration_secs: (!duration.is_zero()).then(|| duration.as_secs_f64()),
            bitrate: properties.audio_bitrate().or(properties.overall_bitrate()),
            sample_rate: properties.sample_rate(),
            channels: properties.channels(),
            bits_per_sample: properties.bit_depth(),
            codec: Some(codec_name(file_type).to_string()),
            container: Some(format!("{:?}", file_type)),
            ..Default::default()
        };

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
        if let Some(tag) = tag {
            metadata.title = tag.title().map(|s| s.to_string());
            metadata.artist = tag.artist().map(|s| s.to_string());
            metadata.album = tag.album().map(|s| s.to_string());
            metadata.year = tag.year();
            metadata.genre = tag.genre().map(|s| s.to_string());
            metadata.track_number = tag.track();
            metadata.track_total = tag.track_total();
            metadata.disc_number = tag.disk();
            metadata.disc_total = tag.disk_total();
            metadata.composer = tag.get_string(&ItemKey::Composer).map(|s| s.to_string());
            metadata.comment = tag.comment().map(|s| s.to_string());
        }

        // Première image trouvée, tous tags confondus
        metadata.picture = tagged_file
            .tags()
            .iter()
            .flat_map(|tag| tag.pictures())
            .next()
            .map(|picture| Picture {
                mime: picture
                    .mime_type()
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "image/jpeg".to_string()),
                data: picture.data().to_vec(),
            });

        metadata
    }

    /// Extrait les métadonnées d'un fichier audio (bloquant)
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| MetadataError::Parse(e.to_string()))?
            .options(ParseOptions::new())
            .read()
            .map_err(|e| MetadataError::Parse(e.to_string()))?;
        Ok(Self::from_tagged_file(&tagged_file))
    }

    /// Extrait les métadonnées de données audio en mémoire (bloquant)
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetadataError> {
        let tagged_file = Probe::new(std::io::Cursor::new(data))
            .guess_file_type()?
            .options(ParseOptions::new())
            .read()
            .map_err(|e| MetadataError::Parse(e.to_string()))?;
        Ok(Self::from_tagged_file(&tagged_file))
    }
}

fn codec_name(file_type: lofty::file::FileType) -> &'static str {
    use lofty::file::FileType;
    match file_type {
        FileType::Mpeg => "MPEG-1 Layer 3",
        FileType::Flac => "FLAC",
        FileType::Mp4 => "AAC",
        FileType::Aac => "AAC",
        FileType::Vorbis => "Vorbis",
        FileType::Opus => "Opus",
        FileType::Wav => "PCM",
        FileType::Aiff => "PCM",
        FileType::Ape => "Monkey's Audio",
        FileType::WavPack => "WavPack",
        FileType::Speex => "Speex",
        _ => "unknown",
    }
}

/// Outil d'extraction de métadonnées
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Lit tags, propriétés et pochette de `path`
    async fn extract(&self, path: &Path) -> Result<AudioMetadata, MetadataError>;
}

/// [`MetadataExtractor`] basé sur `lofty`, exécuté hors du runtime async
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyExtractor;

#[async_trait]
impl MetadataExtractor for LoftyExtractor {
    async fn extract(&self, path: &Path) -> Result<AudioMetadata, MetadataError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || AudioMetadata::from_file(&path))
            .await
            .map_err(|e| MetadataError::Parse(format!("extraction task failed: {}", e)))?
    }
}
