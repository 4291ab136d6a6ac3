//! Réponses HTTP à plages d'octets (`Range: bytes=start-end`)
//!
//! Utilisé par la passerelle `/music/{name}` et par les segments HLS.
//! Une seule plage par requête ; une fin de plage omise est plafonnée à
//! `chunk_size` octets.

use crate::error::error_response;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use std::future::Future;
use tracing::warn;
use tunestore::{
    ByteStream, RangeError, StoreError, parse_range, unsatisfiable_content_range,
};

/// Description de la ressource servie
#[derive(Debug, Clone, Copy)]
pub struct RangedResource<'a> {
    /// Nom utilisé dans les logs
    pub name: &'a str,
    pub size: u64,
    pub content_type: &'a str,
    pub cache_control: Option<&'a str>,
}

/// Sert `resource` en tenant compte de l'en-tête `Range` de `headers`
///
/// `open(start, end)` ouvre la plage inclusive demandée. Sans en-tête
/// `Range`, la ressource complète est servie en 200 avec
/// `Accept-Ranges: bytes`.
pub async fn serve_range<F, Fut>(
    headers: &HeaderMap,
    resource: RangedResource<'_>,
    chunk_size: u64,
    open: F,
) -> Response
where
    F: FnOnce(u64, u64) -> Fut,
    Fut: Future<Output = Result<ByteStream, StoreError>>,
{
    let RangedResource {
        name,
        size,
        content_type,
        cache_control,
    } = resource;

    let range = match headers.get(header::RANGE) {
        None => None,
        Some(value) => {
            let Ok(value) = value.to_str() else {
                warn!(name, "Non-ASCII Range header");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "INVALID_RANGE",
                    "Range header is not valid ASCII",
                );
            };
            match parse_range(value, size, chunk_size) {
                Ok(range) => Some(range),
                Err(RangeError::Unsatisfiable { size }) => {
                    return (
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        [
                            (header::CONTENT_RANGE, unsatisfiable_content_range(size)),
                            (header::ACCEPT_RANGES, "bytes".to_string()),
                        ],
                    )
                        .into_response();
                }
                Err(e @ RangeError::Malformed(_)) => {
                    warn!(name, error = %e, "Rejected Range header");
                    return error_response(StatusCode::BAD_REQUEST, "INVALID_RANGE", e.to_string());
                }
            }
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response_headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = cache_control.and_then(|c| HeaderValue::from_str(c).ok()) {
        response_headers.insert(header::CACHE_CONTROL, value);
    }

    let (status, start, end) = match range {
        Some(range) => {
            if let Ok(value) = HeaderValue::from_str(&range.content_range(size)) {
                response_headers.insert(header::CONTENT_RANGE, value);
            }
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            (StatusCode::PARTIAL_CONTENT, range.start, range.end)
        }
        None => {
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            if size == 0 {
                return (StatusCode::OK, response_headers, Body::empty()).into_response();
            }
            (StatusCode::OK, 0, size - 1)
        }
    };

    let stream = match open(start, end).await {
        Ok(stream) => stream,
        Err(e) if e.is_not_found() => {
            return error_response(StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string());
        }
        Err(e) => {
            warn!(name, error = %e, "Cannot open byte range");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string());
        }
    };

    // Les en-têtes sont déjà partis quand le flux échoue : la connexion est
    // simplement coupée.
    let owned_name = name.to_string();
    let stream = stream.inspect_err(move |e| {
        warn!(name = %owned_name, error = %e, "Stream aborted after headers were sent");
    });

    (status, response_headers, Body::from_stream(stream)).into_response()
}
