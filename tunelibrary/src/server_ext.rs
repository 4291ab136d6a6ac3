//! Routes HTTP de la bibliothèque et extension de `tuneserver::Server`
//!
//! - `GET /music/{name}` : passerelle de streaming (requêtes `Range`)
//! - `GET /api/music` : pistes ordonnées
//! - `GET /api/info/{name}` : informations détaillées
//! - `POST /api/verify-password`
//! - `POST /api/playlist/order`
//! - `POST /api/upload` : multipart `musicFiles` (×20 max) + `password`
//! - `DELETE /api/music/{name}` : `{ "password": ... }`

use crate::error::LibraryError;
use crate::library::Library;
use crate::track::{TrackInfo, TrackSummary, music_url};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::Field},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::{SinkExt, channel::mpsc};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tracing::{info, warn};
use tunestore::{StagedFile, mime_for};
use tuneserver::{ErrorResponse, RangedResource, Server, serve_range};
use utoipa::{OpenApi, ToSchema};

const MUSIC_CACHE_CONTROL: &str = "public, max-age=31536000";
const FILES_FIELD: &str = "musicFiles";
const PASSWORD_FIELD: &str = "password";
pub const MAX_UPLOAD_FILES: usize = 20;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyPasswordResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<UploadedFile>,
}

/// GET /music/{name} - Flux audio, entier ou par plage
#[utoipa::path(
    get,
    path = "/music/{name}",
    params(("name" = String, Path, description = "Nom du fichier audio")),
    responses(
        (status = 200, description = "Fichier complet"),
        (status = 206, description = "Plage demandée"),
        (status = 404, description = "Fichier absent", body = ErrorResponse),
        (status = 416, description = "Plage non satisfaisable")
    ),
    tag = "library"
)]
pub async fn stream_music(
    State(library): State<Arc<Library>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let store = library.store();
    let stat = match store.stat(&name).await {
        Ok(stat) => stat,
        Err(e) => return LibraryError::from(e).into_response(),
    };

    serve_range(
        &headers,
        RangedResource {
            name: &name,
            size: stat.size,
            content_type: mime_for(&name),
            cache_control: Some(MUSIC_CACHE_CONTROL),
        },
        library.chunk_size(),
        |start, end| store.open_range(&name, start, end),
    )
    .await
}

/// GET /api/music - Liste des pistes
#[utoipa::path(
    get,
    path = "/api/music",
    responses(
        (status = 200, description = "Pistes, nouveaux fichiers en tête", body = [TrackSummary])
    ),
    tag = "library"
)]
pub async fn list_tracks(
    State(library): State<Arc<Library>>,
) -> Result<Json<Vec<TrackSummary>>, LibraryError> {
    Ok(Json(library.tracks().await?))
}

/// GET /api/info/{name} - Informations détaillées
#[utoipa::path(
    get,
    path = "/api/info/{name}",
    params(("name" = String, Path, description = "Nom du fichier audio")),
    responses(
        (status = 200, description = "Informations", body = TrackInfo),
        (status = 404, description = "Fichier absent", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn track_info(
    State(library): State<Arc<Library>>,
    Path(name): Path<String>,
) -> Result<Json<TrackInfo>, LibraryError> {
    Ok(Json(library.track_info(&name).await?))
}

/// POST /api/verify-password - Vérifie le mot de passe d'administration
#[utoipa::path(
    post,
    path = "/api/verify-password",
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Mot de passe correct", body = VerifyPasswordResponse),
        (status = 401, description = "Mot de passe incorrect", body = VerifyPasswordResponse)
    ),
    tag = "library"
)]
pub async fn verify_password(
    State(library): State<Arc<Library>>,
    Json(request): Json<PasswordRequest>,
) -> Response {
    if library.check_password(&request.password) {
        Json(VerifyPasswordResponse {
            verified: true,
            error: None,
        })
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(VerifyPasswordResponse {
                verified: false,
                error: Some("Wrong password".to_string()),
            }),
        )
            .into_response()
    }
}

/// POST /api/playlist/order - Enregistre l'ordre de lecture
#[utoipa::path(
    post,
    path = "/api/playlist/order",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Ordre enregistré", body = SuccessResponse),
        (status = 400, description = "`order` absent ou invalide", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn save_playlist_order(
    State(library): State<Arc<Library>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SuccessResponse>, LibraryError> {
    let order = body
        .get("order")
        .cloned()
        .and_then(|order| serde_json::from_value::<Vec<String>>(order).ok())
        .ok_or_else(|| LibraryError::BadRequest("`order` must be an array of file names".into()))?;

    library.save_order(&order).await?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "Playlist order saved".to_string(),
    }))
}

fn multipart_error(err: impl std::fmt::Display) -> LibraryError {
    LibraryError::BadRequest(format!("Upload error: {}", err))
}

/// Nom de fichier d'un champ multipart, sans composante de chemin
fn upload_file_name(field: &Field<'_>) -> Result<String, LibraryError> {
    let raw = field
        .file_name()
        .ok_or_else(|| LibraryError::BadRequest("File part without a file name".into()))?;
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    Ok(name.to_string())
}

/// Transfère un champ multipart vers la zone d'attente sans le charger en mémoire
async fn stage_field(
    library: &Library,
    name: &str,
    mut field: Field<'_>,
) -> Result<StagedFile, LibraryError> {
    let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(8);

    let feed = async move {
        loop {
            let item = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(e) => Err(io::Error::other(e.to_string())),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    };

    let ((), staged) = tokio::join!(feed, library.stage_track(name, Box::pin(rx)));
    staged
}

/// Lit tout le corps multipart ; les fichiers restent en attente
async fn receive_upload(
    library: &Library,
    multipart: &mut Multipart,
    staged: &mut Vec<StagedFile>,
) -> Result<bool, LibraryError> {
    let mut password_ok = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            PASSWORD_FIELD => {
                let candidate = field.text().await.map_err(multipart_error)?;
                if !library.check_password(&candidate) {
                    return Err(LibraryError::Unauthorized);
                }
                password_ok = true;
            }
            FILES_FIELD => {
                if staged.len() >= MAX_UPLOAD_FILES {
                    return Err(LibraryError::BadRequest(format!(
                        "At most {} files per upload",
                        MAX_UPLOAD_FILES
                    )));
                }
                let is_audio = field
                    .content_type()
                    .is_some_and(|mime| mime.starts_with("audio/"));
                if !is_audio {
                    return Err(LibraryError::BadRequest(
                        "Only audio files can be uploaded".into(),
                    ));
                }
                let name = upload_file_name(&field)?;
                staged.push(stage_field(library, &name, field).await?);
            }
            other => {
                warn!(field = other, "Ignoring unexpected upload field");
            }
        }
    }

    Ok(password_ok)
}

/// POST /api/upload - Ajoute des fichiers audio (multipart)
///
/// Champs : `musicFiles` (20 au plus, type `audio/*`) et `password`. Les
/// fichiers ne sont publiés qu'une fois le corps lu et le mot de passe
/// vérifié ; sinon ils sont abandonnés et la bibliothèque reste intacte.
#[utoipa::path(
    post,
    path = "/api/upload",
    responses(
        (status = 200, description = "Fichiers enregistrés", body = UploadResponse),
        (status = 400, description = "Aucun fichier ou fichier refusé", body = ErrorResponse),
        (status = 401, description = "Mot de passe incorrect", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn upload_tracks(
    State(library): State<Arc<Library>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, LibraryError> {
    let mut staged = Vec::new();

    let outcome = match receive_upload(&library, &mut multipart, &mut staged).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(LibraryError::Unauthorized),
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        for file in staged {
            library.discard_track(file).await;
        }
        return Err(e);
    }

    if staged.is_empty() {
        return Err(LibraryError::BadRequest("No file uploaded".into()));
    }

    let mut saved = Vec::with_capacity(staged.len());
    let mut pending = staged.into_iter();
    while let Some(file) = pending.next() {
        let name = file.name().to_string();
        if let Err(e) = library.commit_track(file).await {
            for rest in pending.by_ref() {
                library.discard_track(rest).await;
            }
            return Err(e);
        }
        saved.push(name);
    }

    info!(count = saved.len(), "Upload complete");
    Ok(Json(UploadResponse {
        message: format!("{} file(s) uploaded", saved.len()),
        files: saved
            .into_iter()
            .map(|name| UploadedFile {
                path: music_url(&name),
                file_name: name,
            })
            .collect(),
    }))
}

/// DELETE /api/music/{name} - Supprime une piste et ses caches
#[utoipa::path(
    delete,
    path = "/api/music/{name}",
    params(("name" = String, Path, description = "Nom du fichier audio")),
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Piste supprimée", body = SuccessResponse),
        (status = 401, description = "Mot de passe incorrect", body = ErrorResponse),
        (status = 404, description = "Fichier absent", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn delete_track(
    State(library): State<Arc<Library>>,
    Path(name): Path<String>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<SuccessResponse>, LibraryError> {
    if !library.check_password(&request.password) {
        return Err(LibraryError::Unauthorized);
    }
    library.delete_track(&name).await?;
    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Deleted {}", name),
    }))
}

/// Router de la bibliothèque (chemins complets)
pub fn create_router(library: Arc<Library>) -> Router {
    Router::new()
        .route("/music/{name}", get(stream_music))
        .route("/api/music", get(list_tracks))
        .route("/api/music/{name}", axum::routing::delete(delete_track))
        .route("/api/info/{name}", get(track_info))
        .route("/api/verify-password", post(verify_password))
        .route("/api/playlist/order", post(save_playlist_order))
        .route(
            "/api/upload",
            post(upload_tracks).layer(DefaultBodyLimit::disable()),
        )
        .with_state(library)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        stream_music,
        list_tracks,
        track_info,
        verify_password,
        save_playlist_order,
        upload_tracks,
        delete_track
    ),
    components(schemas(
        TrackSummary,
        TrackInfo,
        PasswordRequest,
        VerifyPasswordResponse,
        SuccessResponse,
        UploadedFile,
        UploadResponse,
        ErrorResponse
    )),
    tags((name = "library", description = "Bibliothèque musicale"))
)]
pub struct ApiDoc;

/// Trait d'extension pour ajouter la bibliothèque à `tuneserver`
#[async_trait::async_trait]
pub trait LibraryExt {
    async fn register_library(&mut self, library: Arc<Library>);
}

#[async_trait::async_trait]
impl LibraryExt for Server {
    async fn register_library(&mut self, library: Arc<Library>) {
        self.add_openapi(create_router(library), ApiDoc::openapi(), "library")
            .await;
    }
}
