//! radioserver extension for the station
//!
//! Provides an extension trait that mounts the station (HTTP routes, WebSocket
//! channel, rotation clock) on a `radioserver::Server`.

use crate::station::{RadioStation, StationSettings};
use radioconfig::get_config;
use std::sync::Arc;
use tracing::info;

/// Extension trait for radioserver::Server
///
/// # Routes
///
/// - `/genres`
/// - `/{genre}/current.mp3`
/// - `/ws`
/// - `/info`
pub trait RadioServerExt {
    /// Builds the station from the global configuration
    async fn init_station(&mut self) -> anyhow::Result<Arc<RadioStation>>;

    /// Builds the station from explicit settings
    ///
    /// The rotation clock starts right away and stops with the server (its
    /// token is derived from the server shutdown token).
    async fn init_station_with(
        &mut self,
        settings: StationSettings,
    ) -> anyhow::Result<Arc<RadioStation>>;
}

impl RadioServerExt for radioserver::Server {
    async fn init_station(&mut self) -> anyhow::Result<Arc<RadioStation>> {
        let settings = StationSettings::from_config(&get_config())?;
        self.init_station_with(settings).await
    }

    async fn init_station_with(
        &mut self,
        settings: StationSettings,
    ) -> anyhow::Result<Arc<RadioStation>> {
        let server = self.info();
        let genres_root = settings.music_root.display().to_string();
        let rotation_interval_secs = settings.rotation_interval.as_secs();

        let station = Arc::new(RadioStation::new(
            settings,
            self.shutdown_token().child_token(),
        ));

        self.add_router("/", station.router()).await;
        self.add_route("/info", move || {
            let server = server.clone();
            let genres_root = genres_root.clone();
            async move {
                serde_json::json!({
                    "name": server.name,
                    "version": env!("CARGO_PKG_VERSION"),
                    "base_url": server.base_url,
                    "http_port": server.http_port,
                    "genres_root": genres_root,
                    "rotation_interval_secs": rotation_interval_secs,
                })
            }
        })
        .await;

        station.start().await;
        info!("📻 Station routes registered");

        Ok(station)
    }
}
