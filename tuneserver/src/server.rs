//! # Module Server - API de haut niveau pour Axum
//!
//! Les crates de TuneBox construisent leurs propres `Router` (chemins
//! complets) et les greffent au serveur ; le serveur ne connaît aucune
//! d'entre elles.
//!
//! - `add_router()` : greffe un sous-router
//! - `add_openapi()` : greffe un router documenté et sa Swagger UI
//! - `add_static_dir()` : sert un répertoire en fallback (client web)
//! - `init_logging()` : logs en mémoire, `/log-dump`, `/log-sse`, `/api/log_setup`

use crate::logs::{LogState, LoggingOptions, LogsApiDoc, create_logs_router, init_logging, log_dump, log_sse};
use anyhow::{Context, Result};
use axum::Router;
use axum::handler::Handler;
use axum::routing::get;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tuneconfig::get_config;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Info serveur sérialisable
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    static_dir: Option<PathBuf>,
    join_handle: Option<JoinHandle<()>>,
    log_state: Option<LogState>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// ```rust
    /// # use tuneserver::Server;
    /// let server = Server::new("TuneBox", "localhost", 3337);
    /// ```
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            static_dir: None,
            join_handle: None,
            log_state: None,
        }
    }

    /// Serveur dont l'hôte et le port viennent de la configuration
    pub fn new_configured() -> Self {
        let config = get_config();
        Self::new("TuneBox", config.get_base_url(), config.get_http_port())
    }

    /// Ajoute un handler GET avec état
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route(path, get(handler)).with_state(state);
        self.add_router("/", route).await;
    }

    /// Ajoute un sous-router au serveur
    ///
    /// - Si `path` est "/", merge directement au router principal
    /// - Sinon, nest le router sous le chemin donné
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };
    }

    /// Ajoute une API documentée avec OpenAPI et Swagger UI
    ///
    /// `api_router` porte des chemins complets (ex: `/api/hls/{name}/status`).
    ///
    /// - `/swagger-ui/{name}` affiche la documentation
    /// - `/api-docs/{name}.json` fournit la spécification
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        let swagger = SwaggerUi::new(format!("/swagger-ui/{}", name))
            .url(format!("/api-docs/{}.json", name), openapi);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).merge(api_router).merge(swagger);
    }

    /// Sert `dir` pour toute requête qui ne correspond à aucune route
    pub fn add_static_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        info!(directory = %dir.display(), "Serving static web client");
        self.static_dir = Some(dir);
    }

    /// Router complet, tel qu'il sera servi par `start()`
    pub async fn router(&self) -> Router {
        let router = self.router.read().await.clone();
        match &self.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        }
    }

    /// Démarre le serveur HTTP
    ///
    /// L'écoute est ouverte avant le retour : une erreur de bind est remontée
    /// à l'appelant. L'arrêt se fait proprement sur Ctrl+C.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot listen on {}", addr))?;

        info!(
            "Server {} running at http://{}:{}",
            self.name, self.base_url, self.http_port
        );

        let router = self.router().await;
        self.join_handle = Some(tokio::spawn(async move {
            let shutdown = async {
                match signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl+C reçu, arrêt gracieux"),
                    Err(e) => {
                        warn!("Cannot listen for Ctrl+C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };
            if let Err(e) = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server stopped with error: {}", e);
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }

    /// État des logs, si `init_logging` a été appelé
    pub fn log_state(&self) -> Option<LogState> {
        self.log_state.clone()
    }

    /// Initialise le système de logging et enregistre ses routes
    ///
    /// - `GET /log-sse` : flux SSE (`?error=true&search=hls`)
    /// - `GET /log-dump` : contenu du buffer
    /// - `GET|POST /api/log_setup` : niveau de log courant
    pub async fn init_logging(&mut self, options: LoggingOptions) -> LogState {
        let log_state = init_logging(options);
        self.register_log_routes(log_state.clone()).await;
        self.log_state = Some(log_state.clone());
        log_state
    }

    /// Enregistre les routes de logs pour un état existant
    pub async fn register_log_routes(&mut self, log_state: LogState) {
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_openapi(create_logs_router(log_state), LogsApiDoc::openapi(), "logs")
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn log_routes_are_mounted() {
        let mut server = Server::new("test", "localhost", 0);
        server.register_log_routes(LogState::new(10, None)).await;
        let router = server.router().await;

        let dump = router
            .clone()
            .oneshot(Request::get("/log-dump").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(dump.status(), StatusCode::OK);

        let setup = router
            .oneshot(Request::get("/api/log_setup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(setup.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn static_dir_is_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();

        let mut server = Server::new("test", "localhost", 0);
        server.add_static_dir(dir.path());
        let router = server.router().await;

        let response = router
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
