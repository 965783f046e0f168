//! # radiostation - Per-genre MP3 radio
//!
//! Every genre has one "current" track shared by all listeners, like a
//! broadcast radio.
//!
//! ## Features
//!
//! - 📂 **Catalog**: `<music_root>/<genre>/<N>.mp3`, rescanned at most once per interval
//! - ⏱️ **Rotation clock**: a single task advances every genre
//! - 👥 **Visitor count**: pushed as JSON over the `/ws` WebSocket
//! - 🌐 **HTTP routes**: `/genres`, `/{genre}/current.mp3`, `/info`
//!
//! ## Example
//!
//! ```rust,ignore
//! use radioserver::Server;
//! use radiostation::RadioServerExt;
//!
//! let mut server = Server::new_configured();
//! server.init_logging().await;
//! let station = server.init_station().await?;
//! server.start().await?;
//! server.wait().await;
//! station.shutdown().await;
//! ```

pub mod catalog;
pub mod config_ext;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod rotation;
pub mod server_ext;
pub mod station;

pub use catalog::{Catalog, Track, TrackList};
pub use config_ext::StationConfigExt;
pub use error::{Error, Result};
pub use gateway::GatewayState;
pub use registry::{ConnectionId, ConnectionRegistry, PushMessage, Registration};
pub use rotation::{RotationClock, RotationHandle, RotationState};
pub use server_ext::RadioServerExt;
pub use station::{RadioStation, StationSettings};
