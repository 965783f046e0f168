//! The station: owns the catalog, the rotation state, the connection registry
//! and the rotation task, and ties their lifecycle together.

use crate::catalog::Catalog;
use crate::config_ext::StationConfigExt;
use crate::error::Result;
use crate::gateway::{self, GatewayState};
use crate::registry::ConnectionRegistry;
use crate::rotation::{RotationClock, RotationHandle, RotationState};
use axum::Router;
use radioconfig::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runtime settings of a station.
#[derive(Debug, Clone)]
pub struct StationSettings {
    pub music_root: PathBuf,
    /// Rotation period; also the catalog staleness bound.
    pub rotation_interval: Duration,
    pub push_buffer: usize,
}

impl StationSettings {
    pub fn new(music_root: impl Into<PathBuf>, rotation_interval: Duration) -> Self {
        Self {
            music_root: music_root.into(),
            rotation_interval,
            push_buffer: 16,
        }
    }

    pub fn with_push_buffer(mut self, push_buffer: usize) -> Self {
        self.push_buffer = push_buffer;
        self
    }

    /// Reads the `station.*` section of the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            music_root: config.get_music_root()?,
            rotation_interval: config.get_rotation_interval()?,
            push_buffer: config.get_push_buffer()?,
        })
    }
}

pub struct RadioStation {
    settings: StationSettings,
    catalog: Arc<Catalog>,
    rotation: Arc<RotationState>,
    registry: Arc<ConnectionRegistry>,
    token: CancellationToken,
    clock: Mutex<Option<RotationHandle>>,
}

impl RadioStation {
    /// Builds an idle station. `token` is usually a child of the server's
    /// shutdown token so the station stops with the server.
    pub fn new(settings: StationSettings, token: CancellationToken) -> Self {
        let catalog = Arc::new(Catalog::new(
            settings.music_root.clone(),
            settings.rotation_interval,
        ));
        Self {
            catalog,
            rotation: Arc::new(RotationState::new()),
            registry: Arc::new(ConnectionRegistry::new(settings.push_buffer)),
            settings,
            token,
            clock: Mutex::new(None),
        }
    }

    /// Spawns the rotation clock. Calling it again while running is a no-op.
    pub async fn start(&self) {
        if self.token.is_cancelled() {
            warn!("Station already shut down, rotation clock not started");
            return;
        }

        let mut clock = self.clock.lock().await;
        if clock.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        info!(
            music_root = %self.settings.music_root.display(),
            interval_secs = self.settings.rotation_interval.as_secs(),
            "Starting station"
        );
        let rotation = RotationClock::new(
            self.catalog.clone(),
            self.rotation.clone(),
            self.settings.rotation_interval,
        );
        *clock = Some(rotation.spawn(self.token.child_token()));
    }

    /// Stops the rotation task and closes every push connection.
    pub async fn shutdown(&self) {
        self.token.cancel();
        if let Some(handle) = self.clock.lock().await.take() {
            handle.stop().await;
        }
        let closed = self.registry.close_all().await;
        info!(closed, "Station stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.clock
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Routes `/genres`, `/{genre}/current.mp3` and `/ws`.
    pub fn router(&self) -> Router {
        gateway::router(GatewayState {
            catalog: self.catalog.clone(),
            rotation: self.rotation.clone(),
            registry: self.registry.clone(),
            shutdown: self.token.clone(),
        })
    }

    /// Runs one rotation step immediately, outside the clock.
    pub async fn rotate_now(&self) -> usize {
        RotationClock::new(
            self.catalog.clone(),
            self.rotation.clone(),
            self.settings.rotation_interval,
        )
        .tick()
        .await
    }

    /// Logs the genres currently on disk and returns how many were found.
    ///
    /// A music root that cannot be read is logged, never fatal.
    pub async fn announce_genres(&self) -> usize {
        match self.catalog.list_genres().await {
            Ok(genres) => {
                info!("✅ {} genre(s) found", genres.len());
                for genre in &genres {
                    info!("  - {}", genre);
                }
                genres.len()
            }
            Err(err) => {
                warn!(
                    music_root = %self.settings.music_root.display(),
                    "Cannot list genres: {}", err
                );
                0
            }
        }
    }

    pub fn settings(&self) -> &StationSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn rotation(&self) -> &Arc<RotationState> {
        &self.rotation
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(root: &std::path::Path) -> RadioStation {
        RadioStation::new(
            StationSettings::new(root, Duration::from_secs(30)),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let station = station(root.path());

        assert!(!station.is_running().await);
        station.start().await;
        station.start().await;
        assert!(station.is_running().await);

        station.shutdown().await;
        assert!(!station.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_restart_after_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let station = station(root.path());

        station.shutdown().await;
        station.start().await;
        assert!(!station.is_running().await);
    }

    #[tokio::test]
    async fn test_unreadable_music_root_is_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let not_a_dir = root.path().join("music");
        std::fs::write(&not_a_dir, "plain file").unwrap();
        let station = station(&not_a_dir);

        assert!(station.catalog().list_genres().await.is_err());
        assert_eq!(station.announce_genres().await, 0);

        std::fs::remove_file(&not_a_dir).unwrap();
        std::fs::create_dir_all(not_a_dir.join("ambient")).unwrap();
        assert_eq!(station.announce_genres().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let root = tempfile::tempdir().unwrap();
        let station = station(root.path());
        let mut visitor = station.registry().register().await;

        station.shutdown().await;
        assert_eq!(station.registry().visitor_count().await, 0);

        while visitor.receiver.recv().await.is_some() {}
    }
}
