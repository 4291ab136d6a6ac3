//! Représentations JSON des pistes

use serde::{Deserialize, Serialize};
use tunecache::TrackRecord;
use utoipa::ToSchema;

const UNKNOWN: &str = "Unknown";

/// URL de streaming d'un fichier
pub fn music_url(name: &str) -> String {
    format!("/music/{}", urlencoding::encode(name))
}

/// Entrée de `GET /api/music`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    #[schema(example = "01 - Shine On.flac")]
    pub name: String,
    #[schema(example = "/music/01%20-%20Shine%20On.flac")]
    pub url: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub has_cover: bool,
    /// Identifiant à passer à `/api/cover/{name}`
    pub cover_id: Option<String>,
}

impl From<TrackRecord> for TrackSummary {
    fn from(record: TrackRecord) -> Self {
        Self {
            url: music_url(&record.name),
            name: record.name,
            title: record.title,
            artist: record.artist,
            album: record.album,
            has_cover: record.has_cover,
            cover_id: record.cover_ref,
        }
    }
}

/// Réponse de `GET /api/info/{name}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub file_name: String,
    pub file_size: u64,
    #[schema(example = "4.2 MB")]
    pub file_size_formatted: String,

    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub genre: Option<String>,

    /// Conteneur
    pub format: String,
    pub codec: String,

    /// Durée en secondes
    pub duration: f64,
    #[schema(example = "5:34")]
    pub duration_formatted: String,
    /// kbps
    pub bitrate: u32,
    #[schema(example = "320 kbps")]
    pub bitrate_formatted: String,
    /// Hz
    pub sample_rate: u32,
    #[schema(example = "44.1 kHz")]
    pub sample_rate_formatted: String,
    pub channels: u8,
    #[schema(example = "Stereo")]
    pub channels_formatted: String,
    pub bits_per_sample: u8,

    pub track_number: Option<u32>,
    pub disk_number: Option<u32>,
    pub composer: Option<String>,
    pub comment: Option<String>,
}

impl TrackInfo {
    pub fn new(record: &TrackRecord, file_size: u64) -> Self {
        let details = record.details.clone().unwrap_or_default();
        let duration = details.duration_secs.unwrap_or(0.0);
        let bitrate = details.bitrate.unwrap_or(0);
        let sample_rate = details.sample_rate.unwrap_or(0);
        let channels = details.channels.unwrap_or(0);

        Self {
            file_name: record.name.clone(),
            file_size,
            file_size_formatted: format_file_size(file_size),
            title: record.title.clone(),
            artist: non_empty_or_unknown(&record.artist),
            album: non_empty_or_unknown(&record.album),
            year: details.year,
            genre: details.genre,
            format: details.container.unwrap_or_else(|| UNKNOWN.to_string()),
            codec: details.codec.unwrap_or_else(|| UNKNOWN.to_string()),
            duration,
            duration_formatted: format_duration(duration),
            bitrate,
            bitrate_formatted: if bitrate > 0 {
                format!("{} kbps", bitrate)
            } else {
                UNKNOWN.to_string()
            },
            sample_rate,
            sample_rate_formatted: if sample_rate > 0 {
                format!("{:.1} kHz", sample_rate as f64 / 1000.0)
            } else {
                UNKNOWN.to_string()
            },
            channels,
            channels_formatted: channel_name(channels),
            bits_per_sample: details.bits_per_sample.unwrap_or(0),
            track_number: details.track_number,
            disk_number: details.disc_number,
            composer: details.composer,
            comment: details.comment,
        }
    }
}

fn non_empty_or_unknown(value: &str) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

/// `1536` → `1.5 KB`, deux décimales au plus, zéros finaux retirés
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[exponent])
}

/// `334.5` → `5:34`
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn channel_name(channels: u8) -> String {
    match channels {
        0 => UNKNOWN.to_string(),
        1 => "Mono".to_string(),
        2 => "Stereo".to_string(),
        6 => "5.1 Surround".to_string(),
        n => format!("{} channels", n),
    }
}
