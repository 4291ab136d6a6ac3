//! # tunehls - Transcodage HLS à la demande
//!
//! Les clients qui ne lisent pas le format source (Safari iOS avec FLAC,
//! OGG...) demandent une version HLS de la piste. Le premier appel lance un
//! transcodage ffmpeg en tâche de fond ; les appels suivants, concurrents ou
//! non, rejoignent la même tâche et reçoivent sa progression.
//!
//! ```text
//! NoJob ──request──▶ Transcoding ──exit 0──▶ Done (manifeste sur disque)
//!                         │
//!                         └──échec──▶ Error (répertoire supprimé, relance possible)
//! ```
//!
//! - [`HlsManager`] : orchestrateur, une tâche au plus par fichier
//! - [`ArtifactStore`] : artefacts durables `{key}/index.m3u8` + segments
//! - [`Encoder`] / [`FfmpegEncoder`] : production des segments
//! - [`ProgressReporter`] : progression indicative, croissante, < 100
//! - [`validate_segment_id`] : filtrage des identifiants de segments
//!
//! Aucun délai maximal n'est imposé : une tâche dont le client a cessé de
//! suivre la progression continue jusqu'à sa fin.
//!
//! ## Features
//!
//! - `server` : routes `/api/hls/...` via [`HlsExt`]
//! - `config` : [`HlsConfigExt`] pour `tuneconfig::Config`

pub mod artifact;
pub mod encoder;
pub mod error;
pub mod manager;
pub mod progress;
pub mod segment;

#[cfg(feature = "config")]
pub mod config_ext;

#[cfg(feature = "server")]
pub mod server_ext;

pub use artifact::{ArtifactStore, MANIFEST_NAME, PARTIAL_MANIFEST_NAME, SEGMENT_PATTERN};
pub use encoder::{EncodeHandle, EncodeOutcome, EncodeRequest, Encoder, FfmpegEncoder};
pub use error::HlsError;
pub use manager::{Artifact, DurationHint, HlsManager, JobState, JobStatus, SegmentFile};
pub use progress::ProgressReporter;
pub use segment::validate_segment_id;

#[cfg(feature = "config")]
pub use config_ext::HlsConfigExt;

#[cfg(feature = "server")]
pub use server_ext::{ApiDoc, HlsExt, HlsState, create_router};
