//! # Module Server - API de haut niveau pour Axum
//!
//! Ce module fournit une abstraction simple et ergonomique pour créer des serveurs HTTP
//! avec Axum, en cachant la complexité de la configuration et du routage.
//!
//! ## Fonctionnalités
//!
//! - 🚀 **Routes JSON simples** : Ajoutez des endpoints API avec `add_route()`
//! - 📁 **Fichiers statiques** : Servez un répertoire du disque avec `add_dir()`
//! - 🎯 **Handlers personnalisés** : SSE, WebSocket, etc. avec `add_handler_with_state()`
//! - 🔀 **Sous-routers** : Montez un router complet avec `add_router()`
//! - ⚡ **Gestion gracieuse** : Arrêt propre sur Ctrl+C ou via le token d'arrêt

use crate::logs::{LogState, create_logs_router, init_logging, log_dump, log_sse};
use anyhow::{Context, Result};
use axum::handler::Handler;
use axum::routing::get;
use axum::{Json, Router};
use radioconfig::get_config;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

/// Info serveur sérialisable
#[derive(Clone, Debug, Serialize)]
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
    join_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    log_state: Option<LogState>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - Hôte annoncé dans les logs (ex: "localhost")
    /// * `http_port` - Port HTTP à écouter (0 = port éphémère)
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            local_addr: None,
            shutdown: CancellationToken::new(),
            log_state: None,
        }
    }

    pub fn new_configured() -> Self {
        let config = get_config();
        Self::new("GenreRadio", config.get_base_url(), config.get_http_port())
    }

    /// Token annulé à l'arrêt du serveur
    ///
    /// Les tâches de fond (horloge de rotation, connexions WebSocket) dérivent un
    /// `child_token()` de ce token pour s'arrêter avec le serveur.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ajoute une route JSON dynamique
    ///
    /// Crée un endpoint qui retourne du JSON. La closure fournie sera appelée
    /// à chaque requête GET sur le chemin spécifié.
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// # use radioserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 3000);
    /// server.add_route("/api/status", || async {
    ///     serde_json::json!({
    ///         "status": "online",
    ///         "version": "1.0.0"
    ///     })
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };

        self.add_router("/", Router::new().route(path, get(handler)))
            .await;
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

    /// Sert un répertoire du disque pour toutes les routes non trouvées
    ///
    /// Les répertoires renvoient leur `index.html`. Un répertoire absent n'empêche
    /// pas le démarrage : les requêtes reçoivent simplement un 404.
    pub async fn add_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(directory = %dir.display(), "Static directory not found, assets will answer 404");
        }
        let serve = ServeDir::new(dir).append_index_html_on_directories(true);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).fallback_service(serve);
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

    /// Router complet tel qu'il sera servi (utile pour les tests)
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Démarre le serveur HTTP
    ///
    /// Le port est réservé avant de rendre la main : une erreur de bind est
    /// renvoyée à l'appelant qui doit interrompre le démarrage.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot bind HTTP listener on {}", addr))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(
            "Server {} running at http://{}:{}",
            self.name,
            self.base_url,
            local_addr.port()
        );

        let router = self.router.read().await.clone();
        let shutdown = self.shutdown.clone();
        self.join_handle = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(err) = serve.await {
                error!("HTTP server terminated: {}", err);
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur
    ///
    /// Rend la main après Ctrl+C (arrêt gracieux), après annulation du token
    /// d'arrêt, ou si la tâche serveur se termine d'elle-même.
    pub async fn wait(&mut self) {
        let Some(mut handle) = self.join_handle.take() else {
            return;
        };

        tokio::select! {
            res = signal::ctrl_c() => match res {
                Ok(()) => info!("Ctrl+C reçu, arrêt gracieux"),
                Err(err) => error!("Unable to listen for Ctrl+C: {}", err),
            },
            _ = self.shutdown.cancelled() => {},
            _ = &mut handle => {
                warn!("HTTP server task ended");
                self.shutdown.cancel();
                return;
            }
        }

        self.shutdown.cancel();
        if let Err(err) = handle.await {
            error!("HTTP server task failed: {}", err);
        }
    }

    /// Déclenche l'arrêt gracieux et attend la fin de la tâche serveur
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.join_handle.take() {
            if let Err(err) = handle.await {
                error!("HTTP server task failed: {}", err);
            }
        }
    }

    /// Adresse effectivement écoutée, une fois démarré
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.local_addr.map(|a| a.port()).unwrap_or(self.http_port),
        }
    }

    /// Initialise le système de logging et enregistre les routes de logs
    ///
    /// Cette méthode configure le système de tracing (buffer SSE et console
    /// selon la configuration), puis enregistre les routes `/log-sse`,
    /// `/log-dump` et `/api/log_setup`.
    pub async fn init_logging(&mut self) -> LogState {
        let log_state = init_logging();

        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_router("/api", create_logs_router(log_state.clone()))
            .await;

        self.log_state = Some(log_state.clone());
        log_state
    }

    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_add_route_serves_json() {
        let mut server = Server::new("Test", "localhost", 0);
        server
            .add_route("/info", || async { serde_json::json!({"version": "1.0.0"}) })
            .await;

        let response = server
            .router()
            .await
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["version"], "1.0.0");
    }

    #[tokio::test]
    async fn test_static_dir_is_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>radio</h1>").unwrap();

        let mut server = Server::new("Test", "localhost", 0);
        server.add_dir(dir.path()).await;
        server
            .add_route("/api/ping", || async { "pong" })
            .await;
        let router = server.router().await;

        let index = router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(index.status(), StatusCode::OK);
        let body = to_bytes(index.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>radio</h1>");

        let api = router
            .clone()
            .oneshot(Request::get("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(api.status(), StatusCode::OK);

        let missing = router
            .oneshot(Request::get("/nope.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_reports_bind_failure() {
        let mut first = Server::new("First", "localhost", 0);
        first.start().await.unwrap();
        let port = first.local_addr().unwrap().port();

        let mut second = Server::new("Second", "localhost", port);
        assert!(second.start().await.is_err());

        first.stop().await;
    }

    #[tokio::test]
    async fn test_info_reports_bound_port() {
        let mut server = Server::new("Radio", "radio.local", 0);
        assert_eq!(server.info().http_port, 0);

        server.start().await.unwrap();
        let info = server.info();
        assert_eq!(info.name, "Radio");
        assert_eq!(info.base_url, "radio.local");
        assert_eq!(info.http_port, server.local_addr().unwrap().port());
        assert_ne!(info.http_port, 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_shutdown_token() {
        let mut server = Server::new("Test", "localhost", 0);
        let token = server.shutdown_token().child_token();
        server.start().await.unwrap();

        server.stop().await;
        assert!(token.is_cancelled());
    }
}
