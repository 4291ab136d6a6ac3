//! Encodeurs HLS
//!
//! Un [`Encoder`] lance une tâche annulable et renvoie un [`EncodeHandle`]
//! dont la complétion indique le résultat. L'orchestrateur observe cette
//! complétion pour faire évoluer l'état de la tâche.
//!
//! [`FfmpegEncoder`] pilote un sous-processus `ffmpeg` :
//!
//! ```text
//! ffmpeg -i song.flac -vn -c:a aac -b:a 192k -f hls -hls_time 10 \
//!        -hls_playlist_type vod -hls_base_url segments/ \
//!        -hls_segment_filename {dir}/segment_%05d.ts -progress pipe:1 \
//!        {dir}/index.m3u8.part
//! ```

use crate::error::HlsError;
use crate::progress::{ProgressReporter, from_elapsed, from_position};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lignes de stderr conservées comme diagnostic
const STDERR_TAIL_LINES: usize = 20;

/// Ce que l'encodeur doit produire
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Nom du fichier source (logs)
    pub name: String,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Manifeste écrit pendant l'encodage
    pub partial_manifest: PathBuf,
    /// Manifeste final, créé uniquement en cas de succès
    pub manifest: PathBuf,
    pub segment_pattern: PathBuf,
    /// Préfixe des URL de segments dans le manifeste
    pub url_prefix: String,
    /// Durée de la piste, si connue
    pub duration_hint: Option<f64>,
}

/// Résultat d'un encodage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    Success,
    Failure { detail: String },
    Cancelled,
}

/// Tâche d'encodage en cours
pub struct EncodeHandle {
    pub completion: JoinHandle<EncodeOutcome>,
    pub cancel: CancellationToken,
}

/// Producteur d'artefacts HLS
pub trait Encoder: Send + Sync {
    /// Lance l'encodage en tâche de fond
    ///
    /// Une erreur signifie que rien n'a été lancé.
    fn launch(
        &self,
        request: EncodeRequest,
        progress: ProgressReporter,
    ) -> Result<EncodeHandle, HlsError>;
}

/// Encodeur basé sur le binaire `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
    segment_seconds: u32,
    audio_bitrate: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", 10, "192k")
    }
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>, segment_seconds: u32, audio_bitrate: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            segment_seconds: segment_seconds.max(1),
            audio_bitrate: audio_bitrate.into(),
        }
    }

    fn command(&self, request: &EncodeRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-nostdin", "-y", "-loglevel", "error"])
            .arg("-i")
            .arg(&request.input)
            .args(["-vn", "-c:a", "aac", "-b:a"])
            .arg(&self.audio_bitrate)
            .args(["-f", "hls", "-hls_time"])
            .arg(self.segment_seconds.to_string())
            .args(["-hls_playlist_type", "vod", "-hls_base_url"])
            .arg(&request.url_prefix)
            .arg("-hls_segment_filename")
            .arg(&request.segment_pattern)
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(&request.partial_manifest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Encoder for FfmpegEncoder {
    fn launch(
        &self,
        request: EncodeRequest,
        progress: ProgressReporter,
    ) -> Result<EncodeHandle, HlsError> {
        let mut child = self.command(&request).spawn().map_err(|e| {
            HlsError::Launch(format!("{}: {}", self.binary.display(), e))
        })?;

        info!(
            name = %request.name,
            output = %request.output_dir.display(),
            "ffmpeg started"
        );

        let stderr_tail = child.stderr.take().map(|stderr| tokio::spawn(tail_lines(stderr)));
        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());

        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let completion = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_secs(1));

            let status = loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = child.kill().await {
                            warn!(name = %request.name, error = %e, "Cannot kill ffmpeg");
                        }
                        debug!(name = %request.name, "ffmpeg cancelled");
                        return EncodeOutcome::Cancelled;
                    }
                    status = child.wait() => break status,
                    line = next_line(&mut stdout) => match line {
                        Some(line) => {
                            if let (Some(position), Some(duration)) =
                                (parse_out_time(&line), request.duration_hint)
                            {
                                progress.report(from_position(position, duration));
                            }
                        }
                        None => stdout = None,
                    },
                    _ = ticker.tick() => {
                        if request.duration_hint.is_none() {
                            progress.report(from_elapsed(started.elapsed().as_secs_f64()));
                        }
                    }
                }
            };

            let tail = match stderr_tail {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };

            match status {
                Ok(status) if status.success() => {
                    match tokio::fs::rename(&request.partial_manifest, &request.manifest).await {
                        Ok(()) => {
                            info!(
                                name = %request.name,
                                elapsed_secs = started.elapsed().as_secs(),
                                "ffmpeg finished"
                            );
                            EncodeOutcome::Success
                        }
                        Err(e) => EncodeOutcome::Failure {
                            detail: format!("ffmpeg produced no manifest: {}", e),
                        },
                    }
                }
                Ok(status) => EncodeOutcome::Failure {
                    detail: format!("ffmpeg exited with {}: {}", status, tail),
                },
                Err(e) => EncodeOutcome::Failure {
                    detail: format!("cannot wait for ffmpeg: {}", e),
                },
            }
        });

        Ok(EncodeHandle { completion, cancel })
    }
}

async fn next_line(lines: &mut Option<Lines<BufReader<ChildStdout>>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

/// Dernières lignes d'un flux, jointes par " | "
async fn tail_lines<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join(" | ")
}

/// Position d'encodage en secondes, à partir d'une ligne `-progress`
///
/// `out_time_us` et `out_time_ms` sont tous deux en microsecondes.
pub fn parse_out_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(|us| us.max(0) as f64 / 1_000_000.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_lines() {
        assert_eq!(parse_out_time("out_time_us=12500000"), Some(12.5));
        assert_eq!(parse_out_time("out_time_ms=1000000"), Some(1.0));
        assert_eq!(parse_out_time("out_time_us=N/A"), None);
        assert_eq!(parse_out_time("out_time=00:00:12.500000"), None);
        assert_eq!(parse_out_time("progress=continue"), None);
    }

    #[tokio::test]
    async fn tail_keeps_last_lines() {
        let input: Vec<u8> = (0..30).map(|i| format!("line {}\n", i)).collect::<String>().into_bytes();
        let tail = tail_lines(&input[..]).await;
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn missing_binary_fails_to_launch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let encoder = FfmpegEncoder::new(tmp.path().join("no-such-ffmpeg"), 10, "192k");
        let request = EncodeRequest {
            name: "a.flac".into(),
            input: tmp.path().join("a.flac"),
            output_dir: tmp.path().to_path_buf(),
            partial_manifest: tmp.path().join("index.m3u8.part"),
            manifest: tmp.path().join("index.m3u8"),
            segment_pattern: tmp.path().join("segment_%05d.ts"),
            url_prefix: "segments/".into(),
            duration_hint: None,
        };
        let result = encoder.launch(request, ProgressReporter::new());
        assert!(matches!(result, Err(HlsError::Launch(_))));
    }
}
