//! Enregistrement d'une piste tel que vu par la bibliothèque

use crate::metadata::AudioMetadata;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Métadonnées résumées d'une piste, clé = nom de fichier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    #[cfg_attr(feature = "openapi", schema(example = "01 - Shine On.flac"))]
    pub name: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub has_cover: bool,
    /// Identifiant opaque de la pochette, présent si `has_cover`
    pub cover_ref: Option<String>,
    /// mtime du fichier source (ms depuis l'epoch) au moment de l'extraction
    pub mtime_at_scan: i64,
    /// Détails techniques, absents si l'extraction a échoué
    pub details: Option<AudioMetadata>,
}

impl TrackRecord {
    /// Enregistrement construit à partir des métadonnées extraites
    pub fn from_metadata(name: &str, mtime_ms: i64, metadata: AudioMetadata) -> Self {
        let has_cover = metadata.has_picture();
        Self {
            name: name.to_string(),
            title: non_empty(metadata.title.clone()).unwrap_or_else(|| name.to_string()),
            artist: non_empty(metadata.artist.clone()).unwrap_or_default(),
            album: non_empty(metadata.album.clone()).unwrap_or_default(),
            has_cover,
            cover_ref: has_cover.then(|| name.to_string()),
            mtime_at_scan: mtime_ms,
            details: Some(metadata),
        }
    }

    /// Enregistrement de repli si le fichier est illisible : le titre est le nom du fichier
    pub fn fallback(name: &str, mtime_ms: i64) -> Self {
        Self {
            name: name.to_string(),
            title: name.to_string(),
            artist: String::new(),
            album: String::new(),
            has_cover: false,
            cover_ref: None,
            mtime_at_scan: mtime_ms,
            details: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Millisecondes depuis l'epoch, négatives avant 1970
pub fn mtime_millis(mtime: SystemTime) -> i64 {
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
