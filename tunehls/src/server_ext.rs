//! Routes HTTP HLS et extension de `tuneserver::Server`
//!
//! - `GET /api/hls/{name}/status` : état du transcodage
//! - `GET /api/hls/{name}/playlist.m3u8` : manifeste (200), en cours (202)
//! - `GET /api/hls/{name}/segments/{segment}` : segment, avec `Range`
//! - `GET /swagger-ui/hls` : documentation

use crate::{Artifact, HlsError, HlsManager, JobState, JobStatus};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tracing::warn;
use tuneserver::{ErrorResponse, RangedResource, Server, error_response, serve_range};
use utoipa::OpenApi;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// État partagé des routes HLS
#[derive(Clone)]
pub struct HlsState {
    pub manager: Arc<HlsManager>,
    /// Taille maximale d'une réponse à plage ouverte
    pub chunk_size: u64,
}

fn hls_error_response(name: &str, err: HlsError) -> Response {
    match err {
        HlsError::NotFound(_) => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("File not found: {}", name),
        ),
        HlsError::InvalidSegment(segment) => {
            warn!(name, segment = %segment, "Rejected segment id");
            error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_SEGMENT",
                format!("Invalid segment id: {}", segment),
            )
        }
        HlsError::Store(e) => {
            warn!(name, error = %e, "Rejected HLS request");
            error_response(StatusCode::BAD_REQUEST, "INVALID_NAME", e.to_string())
        }
        other => {
            warn!(name, error = %other, "HLS request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(JobStatus::error(other.to_string())),
            )
                .into_response()
        }
    }
}

/// État du transcodage
#[utoipa::path(
    get,
    path = "/api/hls/{name}/status",
    params(("name" = String, Path, description = "Nom du fichier audio")),
    responses(
        (status = 200, description = "État courant (pending si inconnu)", body = JobStatus)
    ),
    tag = "hls"
)]
pub async fn get_status(State(state): State<HlsState>, Path(name): Path<String>) -> Json<JobStatus> {
    Json(state.manager.poll_status(&name).await)
}

/// Manifeste HLS, transcodage lancé si nécessaire
#[utoipa::path(
    get,
    path = "/api/hls/{name}/playlist.m3u8",
    params(("name" = String, Path, description = "Nom du fichier audio")),
    responses(
        (status = 200, description = "Manifeste complet"),
        (status = 202, description = "Transcodage en cours", body = JobStatus),
        (status = 404, description = "Fichier source absent", body = ErrorResponse),
        (status = 500, description = "Échec du lancement", body = JobStatus)
    ),
    tag = "hls"
)]
pub async fn get_playlist(State(state): State<HlsState>, Path(name): Path<String>) -> Response {
    match state.manager.request_artifact(&name).await {
        Ok(Artifact::Ready { .. }) => match state.manager.manifest(&name).await {
            Ok(body) => (
                [
                    (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response(),
            Err(e) => hls_error_response(&name, e),
        },
        Ok(Artifact::Transcoding { progress }) => (
            StatusCode::ACCEPTED,
            Json(JobStatus {
                state: JobState::Transcoding,
                progress,
                error_detail: None,
            }),
        )
            .into_response(),
        Err(e) => hls_error_response(&name, e),
    }
}

/// Segment d'un artefact terminé
#[utoipa::path(
    get,
    path = "/api/hls/{name}/segments/{segment}",
    params(
        ("name" = String, Path, description = "Nom du fichier audio"),
        ("segment" = String, Path, description = "Identifiant du segment (segment_00000.ts)")
    ),
    responses(
        (status = 200, description = "Segment complet"),
        (status = 206, description = "Plage du segment"),
        (status = 400, description = "Identifiant invalide", body = ErrorResponse),
        (status = 404, description = "Segment absent", body = ErrorResponse),
        (status = 416, description = "Plage non satisfaisable")
    ),
    tag = "hls"
)]
pub async fn get_segment(
    State(state): State<HlsState>,
    Path((name, segment)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let file = match state.manager.fetch_segment(&name, &segment).await {
        Ok(file) => file,
        Err(e) => return hls_error_response(&name, e),
    };

    let artifacts = state.manager.artifacts();
    serve_range(
        &headers,
        RangedResource {
            name: &name,
            size: file.size,
            content_type: SEGMENT_CONTENT_TYPE,
            cache_control: Some(SEGMENT_CACHE_CONTROL),
        },
        state.chunk_size,
        |start, end| artifacts.open_segment(&file.key, &file.segment, start, end),
    )
    .await
}

/// Router HLS (chemins complets)
pub fn create_router(manager: Arc<HlsManager>, chunk_size: u64) -> Router {
    Router::new()
        .route("/api/hls/{name}/status", get(get_status))
        .route("/api/hls/{name}/playlist.m3u8", get(get_playlist))
        .route("/api/hls/{name}/segments/{segment}", get(get_segment))
        .with_state(HlsState {
            manager,
            chunk_size,
        })
}

#[derive(OpenApi)]
#[openapi(
    paths(get_status, get_playlist, get_segment),
    components(schemas(JobStatus, JobState, ErrorResponse)),
    tags((name = "hls", description = "Transcodage HLS à la demande"))
)]
pub struct ApiDoc;

/// Trait d'extension pour ajouter HLS à `tuneserver`
#[async_trait::async_trait]
pub trait HlsExt {
    async fn register_hls(&mut self, manager: Arc<HlsManager>, chunk_size: u64);
}

#[async_trait::async_trait]
impl HlsExt for Server {
    async fn register_hls(&mut self, manager: Arc<HlsManager>, chunk_size: u64) {
        self.add_openapi(create_router(manager, chunk_size), ApiDoc::openapi(), "hls")
            .await;
    }
}
