//! # radioserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit une abstraction simple pour créer le serveur HTTP de GenreRadio.
//!
//! ## Fonctionnalités
//!
//! - 🚀 **API de haut niveau** : routes JSON, handlers avec état, sous-routers
//! - 📁 **Fichiers statiques** : sert un répertoire du disque en fallback (front-end)
//! - 📡 **Logs temps réel** : buffer circulaire exposé via `/log-dump` et `/log-sse`
//! - ⚡ **Arrêt gracieux** : Ctrl+C ou annulation via `CancellationToken`
//!
//! ## Architecture
//!
//! - [`server`] : Implémentation du serveur principal
//! - [`logs`] : Système de logs (capture `tracing`, SSE, réglage du niveau)
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use radioserver::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new("MyServer", "localhost", 8080);
//!     server.init_logging().await;
//!
//!     server.add_route("/api/status", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerInfo};
