use anyhow::Context;
use radioconfig::get_config;
use radioserver::Server;
use radiostation::{RadioServerExt, StationConfigExt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========

    let mut server = Server::new_configured();
    server.init_logging().await;

    // ========== PHASE 2 : Station ==========

    info!("📻 Initializing genre station...");
    let station = server
        .init_station()
        .await
        .context("Failed to initialize the station")?;

    // Une racine illisible n'empêche pas le démarrage : elle est relue à chaque requête
    station.announce_genres().await;

    // Front-end statique servi sur toutes les routes restantes
    let web_root = get_config().get_web_root()?;
    info!("📡 Serving web front-end from {}", web_root.display());
    server.add_dir(&web_root).await;

    // ========== PHASE 3 : Démarrage du serveur ==========

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    info!("✅ GenreRadio is ready!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    station.shutdown().await;
    Ok(())
}
