// logs/mod.rs
mod sselayer;

pub use sselayer::SseLayer;

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
    time::SystemTime,
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};
use tuneconfig::get_config;

use crate::ErrorResponse;

/// Représente une entrée de log
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Buffer circulaire partagé entre le layer, `/log-dump` et `/log-sse`
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: Option<reload::Handle<LevelFilter, Registry>>,
}

impl LogState {
    pub fn new(capacity: usize, reload_handle: Option<reload::Handle<LevelFilter, Registry>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(1000).0,
            max_level: Arc::new(RwLock::new(Level::TRACE)),
            reload_handle,
        }
    }

    /// Change le niveau minimum et recharge le filtre du subscriber
    pub fn set_max_level(&self, level: Level) -> Result<(), reload::Error> {
        *self.max_level.write().unwrap_or_else(|p| p.into_inner()) = level;
        match &self.reload_handle {
            Some(handle) => handle.reload(level_to_levelfilter(level)),
            None => Ok(()),
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.max_level.read().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn push(&self, entry: LogEntry) {
        {
            let mut buf = self.buffer.write().unwrap_or_else(|p| p.into_inner());
            if buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry.clone());
        }
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.buffer
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Query params pour /log-sse
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub error: Option<bool>,
    #[serde(default)]
    pub warn: Option<bool>,
    #[serde(default)]
    pub info: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

/// Handler SSE : historique filtré puis flux temps réel
pub async fn log_sse(
    State(state): State<LogState>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let mut rx = state.subscribe();
    let history = state.dump();
    let stream_state = state.clone();

    let stream = async_stream::stream! {
        let current_level = stream_state.get_max_level();
        for entry in history {
            if !is_level_allowed(&entry.level, current_level) || !filter_entry(&entry, &params) {
                continue;
            }
            if let Ok(json) = serde_json::to_string(&entry) {
                yield Ok::<_, axum::Error>(Event::default().data(json));
            }
        }

        loop {
            let entry = match rx.recv().await {
                Ok(entry) => entry,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !is_level_allowed(&entry.level, stream_state.get_max_level())
                || !filter_entry(&entry, &params)
            {
                continue;
            }
            if let Ok(json) = serde_json::to_string(&entry) {
                yield Ok::<_, axum::Error>(Event::default().data(json));
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Handler REST (dump JSON du buffer)
pub async fn log_dump(State(state): State<LogState>) -> impl IntoResponse {
    Json(state.dump())
}

/// Un log passe si son niveau est au moins aussi grave que `max_level`
fn is_level_allowed(log_level: &str, max_level: Level) -> bool {
    match string_to_level(log_level) {
        // Level: ERROR < WARN < ... < TRACE en verbosité
        Some(level) => level <= max_level,
        None => false,
    }
}

fn filter_entry(entry: &LogEntry, q: &LogQuery) -> bool {
    let lvl = entry.level.to_lowercase();
    let flags = [
        (q.error, "error"),
        (q.warn, "warn"),
        (q.info, "info"),
        (q.debug, "debug"),
        (q.trace, "trace"),
    ];

    let any_flag = flags.iter().any(|(flag, _)| flag.unwrap_or(false));
    let mut allowed = !any_flag
        || flags
            .iter()
            .any(|(flag, name)| flag.unwrap_or(false) && lvl == *name);

    if let Some(search) = &q.search {
        allowed &= entry.message.contains(search.as_str()) || entry.target.contains(search.as_str());
    }

    allowed
}

/// Options d'initialisation du système de logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Capacité du buffer circulaire (nombre d'entrées conservées)
    pub buffer_capacity: usize,
    /// Activer la sortie console
    pub enable_console: bool,
    /// Niveau minimum initial
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    /// Options lues dans la section `host.logger` de la configuration
    pub fn from_config() -> Self {
        let config = get_config();
        let defaults = Self::default();
        Self {
            buffer_capacity: config.get_log_cache_size().unwrap_or(defaults.buffer_capacity),
            enable_console: config.get_log_enable_console().unwrap_or(defaults.enable_console),
            min_level: config
                .get_log_min_level()
                .ok()
                .and_then(|l| string_to_level(&l))
                .unwrap_or(defaults.min_level),
        }
    }
}

/// Installe le subscriber global : filtre rechargeable, [`SseLayer`] et
/// console optionnelle
///
/// ```rust,no_run
/// use tuneserver::logs::{init_logging, LoggingOptions};
///
/// let log_state = init_logging(LoggingOptions::default());
/// ```
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, reload_handle) = reload::Layer::new(level_to_levelfilter(options.min_level));
    let log_state = LogState::new(options.buffer_capacity, Some(reload_handle));
    *log_state.max_level.write().unwrap_or_else(|p| p.into_inner()) = options.min_level;

    // Le filtre doit précéder le SseLayer
    let subscriber = Registry::default()
        .with(filter)
        .with(SseLayer::new(log_state.clone()));

    let result = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };
    if let Err(e) = result {
        tracing::warn!("Global subscriber already installed: {}", e);
    }

    log_state
}

/// Request body pour la configuration du logging
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogSetupRequest {
    pub level: String,
}

/// Response pour la configuration du logging
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

const LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

fn setup_response(level: Level) -> LogSetupResponse {
    LogSetupResponse {
        current_level: level.to_string(),
        available_levels: LEVELS.iter().map(|l| l.to_string()).collect(),
    }
}

/// GET /api/log_setup - niveau courant
#[utoipa::path(
    get,
    path = "/api/log_setup",
    responses(
        (status = 200, description = "Log configuration retrieved successfully", body = LogSetupResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_get(State(state): State<LogState>) -> Json<LogSetupResponse> {
    Json(setup_response(state.get_max_level()))
}

/// POST /api/log_setup - change le niveau de log
#[utoipa::path(
    post,
    path = "/api/log_setup",
    request_body = LogSetupRequest,
    responses(
        (status = 200, description = "Log level updated successfully", body = LogSetupResponse),
        (status = 400, description = "Invalid log level", body = ErrorResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> Response {
    let Some(level) = string_to_level(&payload.level) else {
        return ErrorResponse::new(
            "INVALID_LEVEL",
            "Invalid log level. Must be one of: ERROR, WARN, INFO, DEBUG, TRACE",
        )
        .into_response_with(StatusCode::BAD_REQUEST);
    };

    if let Err(e) = state.set_max_level(level) {
        tracing::warn!("Failed to reload log level filter: {}", e);
    }
    tracing::info!("Log level changed to: {}", level);

    Json(setup_response(level)).into_response()
}

pub fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    LevelFilter::from_level(level)
}

/// Router de l'API de gestion des logs
pub fn create_logs_router(log_state: LogState) -> Router {
    Router::new()
        .route("/api/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(log_state)
}

/// API OpenAPI pour la gestion des logs
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(log_setup_get, log_setup_post),
    components(schemas(LogSetupRequest, LogSetupResponse, ErrorResponse)),
    tags((name = "logs", description = "Log level configuration endpoints"))
)]
pub struct LogsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: SystemTime::now(),
            level: level.to_string(),
            target: "tunehls::manager".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn ring_buffer_keeps_latest_entries() {
        let state = LogState::new(3, None);
        for i in 0..5 {
            state.push(entry("INFO", &format!("msg {}", i)));
        }
        let messages: Vec<_> = state.dump().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn level_ordering() {
        assert!(is_level_allowed("ERROR", Level::INFO));
        assert!(is_level_allowed("INFO", Level::INFO));
        assert!(!is_level_allowed("DEBUG", Level::INFO));
        assert!(is_level_allowed("TRACE", Level::TRACE));
        assert!(!is_level_allowed("bogus", Level::TRACE));
    }

    #[test]
    fn query_filters() {
        let warn = entry("WARN", "segment rejected");
        assert!(filter_entry(&warn, &LogQuery::default()));

        let only_errors = LogQuery {
            error: Some(true),
            ..Default::default()
        };
        assert!(!filter_entry(&warn, &only_errors));

        let search = LogQuery {
            search: Some("segment".into()),
            ..Default::default()
        };
        assert!(filter_entry(&warn, &search));

        let search_target = LogQuery {
            warn: Some(true),
            search: Some("tunehls".into()),
            ..Default::default()
        };
        assert!(filter_entry(&warn, &search_target));
    }

    #[tokio::test]
    async fn push_is_broadcast() {
        let state = LogState::new(10, None);
        let mut rx = state.subscribe();
        state.push(entry("INFO", "hello"));
        assert_eq!(rx.recv().await.unwrap().message, "hello");
    }
}
