//! Error types for the radio station

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;

/// Result type alias for radio station operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving the station
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The genre exists but has no playable track (or does not exist at all)
    #[error("No music files found for genre: {0}")]
    NoTracks(String),

    /// The genre name cannot designate a directory under the music root
    #[error("Invalid genre name: {0:?}")]
    InvalidGenre(String),

    /// The listed track disappeared before it could be opened
    #[error("Track file vanished: {}", .0.display())]
    TrackVanished(PathBuf),

    /// A blocking filesystem task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration error (from radioconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoTracks(_) | Self::InvalidGenre(_) | Self::TrackVanished(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Io(_) | Self::Task(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
