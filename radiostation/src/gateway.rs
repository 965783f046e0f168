//! HTTP and WebSocket routes of the station
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /genres` | Available genres |
//! | `GET /{genre}/current.mp3` | Current track of the genre (audio/mpeg) |
//! | `GET /ws` | Visitor count push channel |

use crate::catalog::{Catalog, validate_genre};
use crate::error::{Error, Result};
use crate::registry::{ConnectionRegistry, Registration};
use crate::rotation::RotationState;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State shared by the station handlers
#[derive(Clone)]
pub struct GatewayState {
    pub catalog: Arc<Catalog>,
    pub rotation: Arc<RotationState>,
    pub registry: Arc<ConnectionRegistry>,
    /// Cancelled when the station stops: WebSocket connections close
    pub shutdown: CancellationToken,
}

#[derive(Debug, Serialize)]
pub struct GenresResponse {
    pub genres: Vec<String>,
}

/// Station router, state already applied
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/genres", get(list_genres))
        .route("/{genre}/current.mp3", get(current_track))
        .route("/ws", get(push_channel))
        .with_state(state)
}

async fn list_genres(State(state): State<GatewayState>) -> Result<Json<GenresResponse>> {
    let genres = state.catalog.list_genres().await?;
    Ok(Json(GenresResponse { genres }))
}

async fn current_track(
    State(state): State<GatewayState>,
    Path(genre): Path<String>,
) -> Result<Response> {
    validate_genre(&genre)?;

    let tracks = state.catalog.list_tracks(&genre).await;
    let Some(position) = state.rotation.position(&genre, tracks.len()).await else {
        return Err(Error::NoTracks(genre));
    };
    let track = &tracks[position - 1];

    let file = match tokio::fs::File::open(track.path()).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::TrackVanished(track.path().to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    let length = file.metadata().await?.len();

    debug!(genre = %genre, index = position, file = track.file_name(), "Serving current track");

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg")),
        (header::CONTENT_LENGTH, HeaderValue::from(length)),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

async fn push_channel(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| handle_push_socket(socket, state))
}

/// Lifetime of a push connection: registered on open, unregistered on close
/// whatever the cause.
async fn handle_push_socket(mut socket: WebSocket, state: GatewayState) {
    let Registration { id, mut receiver } = state.registry.register().await;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            outbound = receiver.recv() => {
                // None: the registry dropped this connection
                let Some(message) = outbound else {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(connection = id, "Cannot encode push message: {}", err);
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.registry.unregister(id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use std::fs;
    use tokio::time::Duration;
    use tower::ServiceExt;

    fn state_for(root: &std::path::Path) -> GatewayState {
        GatewayState {
            catalog: Arc::new(Catalog::new(root, Duration::from_secs(30))),
            rotation: Arc::new(RotationState::new()),
            registry: Arc::new(ConnectionRegistry::default()),
            shutdown: CancellationToken::new(),
        }
    }

    async fn get(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_current_track_headers() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("jazz")).unwrap();
        fs::write(root.path().join("jazz/1.mp3"), b"ID3-jazz").unwrap();
        let router = router(state_for(root.path()));

        let response = get(&router, "/jazz/current.mp3?t=1712345678").await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(headers[header::CONTENT_LENGTH], "8");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");

        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ID3-jazz");
    }

    #[tokio::test]
    async fn test_empty_genre_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("silence")).unwrap();
        fs::write(root.path().join("silence/notes.txt"), "x").unwrap();
        let router = router(state_for(root.path()));

        let response = get(&router, "/silence/current.mp3").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "No music files found for genre: silence");
    }

    #[tokio::test]
    async fn test_vanished_track_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("rock")).unwrap();
        fs::write(root.path().join("rock/1.mp3"), "x").unwrap();
        let router = router(state_for(root.path()));

        assert_eq!(get(&router, "/rock/current.mp3").await.status(), StatusCode::OK);

        // The cached listing still points at the deleted file
        fs::remove_file(root.path().join("rock/1.mp3")).unwrap();
        assert_eq!(
            get(&router, "/rock/current.mp3").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let router = router(state_for(root.path()));

        let response = get(&router, "/..%2F..%2Fetc/current.mp3").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_push_channel_requires_upgrade() {
        let root = tempfile::tempdir().unwrap();
        let state = state_for(root.path());
        let registry = state.registry.clone();
        let router = router(state);

        let response = get(&router, "/ws").await;
        assert!(response.status().is_client_error());
        assert_eq!(registry.visitor_count().await, 0);
    }
}
