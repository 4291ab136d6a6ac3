//! Routes HTTP du cache de pochettes et extension de `tuneserver::Server`
//!
//! - `GET /api/cover/{name}` : image originale
//! - `GET /api/cover/{name}/{size}` : vignette WebP carrée
//! - `GET /swagger-ui/covers` : documentation

use crate::{CoverCache, CoverError};
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tracing::warn;
use tuneserver::{ErrorResponse, Server, error_response};
use utoipa::OpenApi;

const COVER_CACHE_CONTROL: &str = "public, max-age=86400";

fn cover_error_response(name: &str, err: CoverError) -> Response {
    match err {
        CoverError::NotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "NOT_FOUND", format!("No cover for {}", name))
        }
        CoverError::InvalidSize(size) => error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_SIZE",
            format!("Invalid size {} (expected 16..=2048)", size),
        ),
        CoverError::Store(e) => {
            warn!(name, error = %e, "Rejected cover request");
            error_response(StatusCode::BAD_REQUEST, "INVALID_NAME", e.to_string())
        }
        other => {
            warn!(name, error = %other, "Cover request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROCESSING_ERROR",
                other.to_string(),
            )
        }
    }
}

/// Image originale embarquée dans la piste
#[utoipa::path(
    get,
    path = "/api/cover/{name}",
    params(("name" = String, Path, description = "Nom du fichier audio")),
    responses(
        (status = 200, description = "Image originale"),
        (status = 404, description = "Pas de pochette", body = ErrorResponse)
    ),
    tag = "covers"
)]
pub async fn get_cover(State(cache): State<Arc<CoverCache>>, Path(name): Path<String>) -> Response {
    match cache.get(&name).await {
        Ok(cover) => (
            [
                (header::CONTENT_TYPE, cover.mime),
                (header::CACHE_CONTROL, COVER_CACHE_CONTROL.to_string()),
            ],
            cover.data,
        )
            .into_response(),
        Err(e) => cover_error_response(&name, e),
    }
}

/// Vignette WebP carrée
#[utoipa::path(
    get,
    path = "/api/cover/{name}/{size}",
    params(
        ("name" = String, Path, description = "Nom du fichier audio"),
        ("size" = u32, Path, description = "Côté en pixels (16 à 2048)")
    ),
    responses(
        (status = 200, description = "Vignette WebP"),
        (status = 400, description = "Taille invalide", body = ErrorResponse),
        (status = 404, description = "Pas de pochette", body = ErrorResponse)
    ),
    tag = "covers"
)]
pub async fn get_cover_variant(
    State(cache): State<Arc<CoverCache>>,
    Path((name, size)): Path<(String, String)>,
) -> Response {
    let Ok(size) = size.parse::<u32>() else {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_SIZE", "Size must be an integer");
    };
    match cache.get_variant(&name, size).await {
        Ok(data) => (
            [
                (header::CONTENT_TYPE, "image/webp"),
                (header::CACHE_CONTROL, COVER_CACHE_CONTROL),
            ],
            data,
        )
            .into_response(),
        Err(e) => cover_error_response(&name, e),
    }
}

/// Router des pochettes (chemins complets)
pub fn create_router(cache: Arc<CoverCache>) -> Router {
    Router::new()
        .route("/api/cover/{name}", get(get_cover))
        .route("/api/cover/{name}/{size}", get(get_cover_variant))
        .with_state(cache)
}

#[derive(OpenApi)]
#[openapi(
    paths(get_cover, get_cover_variant),
    components(schemas(ErrorResponse)),
    tags((name = "covers", description = "Pochettes extraites des fichiers audio"))
)]
pub struct ApiDoc;

/// Trait d'extension pour ajouter le cache de pochettes à `tuneserver`
#[async_trait::async_trait]
pub trait CoversExt {
    /// Enregistre les routes du cache donné
    async fn register_covers(&mut self, cache: Arc<CoverCache>);
}

#[async_trait::async_trait]
impl CoversExt for Server {
    async fn register_covers(&mut self, cache: Arc<CoverCache>) {
        self.add_openapi(create_router(cache), ApiDoc::openapi(), "covers")
            .await;
    }
}
