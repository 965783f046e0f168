//! radioconfig extension for the station
//!
//! Provides the `StationConfigExt` trait, which adds the station settings
//! (music root, rotation interval...) to `radioconfig::Config`.
//!
//! # Example
//!
//! ```rust,ignore
//! use radioconfig::get_config;
//! use radiostation::StationConfigExt;
//!
//! let config = get_config();
//! let music_root = config.get_music_root()?;
//! let interval = config.get_rotation_interval()?;
//! ```

use anyhow::{Result, bail};
use radioconfig::{Config, value_as_usize};
use serde_yaml::{Number, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Default music root (relative to the working directory)
const DEFAULT_MUSIC_ROOT: &str = "music";

/// Default static front-end directory
const DEFAULT_WEB_ROOT: &str = "web";

/// Default rotation interval, in seconds
const DEFAULT_ROTATION_INTERVAL_SECS: usize = 30;

/// Default outbound queue size of each push connection
const DEFAULT_PUSH_BUFFER: usize = 16;

/// Extension trait for the station configuration
pub trait StationConfigExt {
    /// Returns the music root (`<music_root>/<genre>/<N>.mp3`)
    ///
    /// A relative path is resolved against the process working directory.
    /// The directory is never created: the generation scripts fill it.
    fn get_music_root(&self) -> Result<PathBuf>;

    /// Sets the music root
    fn set_music_root(&self, path: String) -> Result<()>;

    /// Returns the front-end directory served at `/` (default: `web`)
    fn get_web_root(&self) -> Result<PathBuf>;

    /// Sets the front-end directory
    fn set_web_root(&self, path: String) -> Result<()>;

    /// Returns the track rotation interval
    ///
    /// Also the lifetime of a cached catalog listing.
    ///
    /// # Errors
    ///
    /// A value of 0 seconds is rejected.
    fn get_rotation_interval(&self) -> Result<Duration>;

    /// Sets the rotation interval, in seconds (at least 1)
    fn set_rotation_interval(&self, secs: u64) -> Result<()>;

    /// Pending messages tolerated for a slow client (default: 16)
    fn get_push_buffer(&self) -> Result<usize>;

    fn set_push_buffer(&self, size: usize) -> Result<()>;
}

impl StationConfigExt for Config {
    fn get_music_root(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(self.get_path(&["station", "music_root"], DEFAULT_MUSIC_ROOT, &cwd))
    }

    fn set_music_root(&self, path: String) -> Result<()> {
        self.set_value(&["station", "music_root"], Value::String(path))
    }

    fn get_web_root(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(self.get_path(&["station", "web_root"], DEFAULT_WEB_ROOT, &cwd))
    }

    fn set_web_root(&self, path: String) -> Result<()> {
        self.set_value(&["station", "web_root"], Value::String(path))
    }

    fn get_rotation_interval(&self) -> Result<Duration> {
        let secs = match self.get_value(&["station", "rotation_interval_secs"]) {
            Ok(value) => value_as_usize(&value).unwrap_or(DEFAULT_ROTATION_INTERVAL_SECS),
            Err(_) => DEFAULT_ROTATION_INTERVAL_SECS,
        };
        if secs == 0 {
            bail!("station.rotation_interval_secs must be at least 1 second");
        }
        Ok(Duration::from_secs(secs as u64))
    }

    fn set_rotation_interval(&self, secs: u64) -> Result<()> {
        if secs == 0 {
            bail!("station.rotation_interval_secs must be at least 1 second");
        }
        self.set_value(
            &["station", "rotation_interval_secs"],
            Value::Number(Number::from(secs)),
        )
    }

    fn get_push_buffer(&self) -> Result<usize> {
        match self.get_value(&["station", "push_buffer"]) {
            Ok(value) => Ok(value_as_usize(&value)
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_PUSH_BUFFER)),
            Err(_) => Ok(DEFAULT_PUSH_BUFFER),
        }
    }

    fn set_push_buffer(&self, size: usize) -> Result<()> {
        self.set_value(&["station", "push_buffer"], Value::Number(Number::from(size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.get_music_root().unwrap(), cwd.join("music"));
        assert_eq!(config.get_web_root().unwrap(), cwd.join("web"));
        assert_eq!(config.get_rotation_interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.get_push_buffer().unwrap(), 16);
    }

    #[test]
    fn test_absolute_music_root_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);
        let music = dir.path().join("library");

        config
            .set_music_root(music.to_string_lossy().to_string())
            .unwrap();
        assert_eq!(config.get_music_root().unwrap(), music);
        // The configuration never creates the music root
        assert!(!music.exists());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);

        assert!(config.set_rotation_interval(0).is_err());
        config.set_rotation_interval(5).unwrap();
        assert_eq!(config.get_rotation_interval().unwrap(), Duration::from_secs(5));

        config
            .set_value(
                &["station", "rotation_interval_secs"],
                Value::Number(Number::from(0)),
            )
            .unwrap();
        assert!(config.get_rotation_interval().is_err());
    }

    #[test]
    fn test_push_buffer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir);
        config.set_push_buffer(4).unwrap();
        assert_eq!(config.get_push_buffer().unwrap(), 4);
    }
}
