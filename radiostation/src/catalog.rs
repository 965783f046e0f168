//! Catalog of genres and tracks read from the music root.
//!
//! Layout consumed: `<music_root>/<genre>/<N>.mp3`. Every subdirectory is a
//! genre; every `*.mp3` file whose stem starts with digits is a track, ordered
//! by that number.
//!
//! Track listings are cached per genre and rebuilt wholesale once the refresh
//! interval has elapsed, so the filesystem is scanned at most once per
//! interval and per genre whatever the request volume. The genre set itself
//! is never cached.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

const TRACK_EXTENSION: &str = "mp3";

/// One playable file of a genre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    key: u64,
    file_name: String,
    path: PathBuf,
}

impl Track {
    /// Numeric ordering key parsed from the filename prefix.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Immutable, cheaply clonable listing of a genre.
pub type TrackList = Arc<[Track]>;

#[derive(Debug)]
struct CatalogEntry {
    tracks: TrackList,
    last_refreshed: Instant,
}

type EntrySlot = Arc<Mutex<Option<CatalogEntry>>>;

/// Refreshable, time-bucketed view of the music root.
#[derive(Debug)]
pub struct Catalog {
    root: PathBuf,
    refresh_interval: Duration,
    // One slot per genre: a refresh of one genre never blocks another
    entries: Mutex<HashMap<String, EntrySlot>>,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>, refresh_interval: Duration) -> Self {
        Self {
            root: root.into(),
            refresh_interval,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Lists the genres currently present under the music root, sorted by name.
    ///
    /// Evaluated fresh on every call. A missing music root yields no genre.
    pub async fn list_genres(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let genres = tokio::task::spawn_blocking(move || scan_genres(&root)).await??;
        Ok(genres)
    }

    /// Returns the ordered tracks of `genre`.
    ///
    /// Never fails: an invalid name, a missing directory, or an unreadable one
    /// all yield an empty listing. Unreadable directories are cached as empty
    /// until the next refresh; missing ones are not cached at all.
    pub async fn list_tracks(&self, genre: &str) -> TrackList {
        if let Err(err) = validate_genre(genre) {
            debug!("{}", err);
            return empty();
        }

        let Some(slot) = self.slot(genre).await else {
            return empty();
        };

        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.last_refreshed.elapsed() < self.refresh_interval {
                return cached.tracks.clone();
            }
        }

        let tracks = self.scan(genre).await;
        *entry = Some(CatalogEntry {
            tracks: tracks.clone(),
            last_refreshed: Instant::now(),
        });
        tracks
    }

    /// Cache slot of a genre, created only when its directory exists.
    async fn slot(&self, genre: &str) -> Option<EntrySlot> {
        if let Some(slot) = self.entries.lock().await.get(genre) {
            return Some(slot.clone());
        }

        let dir = self.root.join(genre);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return None,
        }

        let mut entries = self.entries.lock().await;
        Some(entries.entry(genre.to_string()).or_default().clone())
    }

    async fn scan(&self, genre: &str) -> TrackList {
        let dir = self.root.join(genre);
        match tokio::task::spawn_blocking(move || scan_tracks(&dir)).await {
            Ok(Ok(tracks)) => {
                debug!(genre, tracks = tracks.len(), "Catalog refreshed");
                tracks.into()
            }
            Ok(Err(err)) => {
                warn!(genre, "Catalog refresh failed, serving empty listing: {}", err);
                empty()
            }
            Err(err) => {
                warn!(genre, "Catalog refresh task failed: {}", err);
                empty()
            }
        }
    }
}

fn empty() -> TrackList {
    Arc::from(Vec::new())
}

/// Rejects names that cannot be a single directory under the music root.
pub fn validate_genre(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidGenre(name.to_string()))
    }
}

/// Ordering key of a track: the integer formed by the leading digits of the stem.
///
/// `"12.mp3"` gives 12, `"007-remix.mp3"` gives 7, `"intro.mp3"` gives `None`.
pub fn parse_track_key(file_name: &str) -> Option<u64> {
    let digits: &str = {
        let end = file_name
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(file_name.len());
        &file_name[..end]
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Directory entries that could be read; a failing entry is logged and
/// skipped so it never hides its siblings.
fn readable<T>(
    entries: impl Iterator<Item = io::Result<T>>,
    dir: &Path,
) -> impl Iterator<Item = T> {
    entries.filter_map(move |entry| match entry {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(dir = %dir.display(), "Skipping unreadable directory entry: {}", err);
            None
        }
    })
}

fn scan_genres(root: &Path) -> io::Result<Vec<String>> {
    let read_dir = match std::fs::read_dir(root) {
        Ok(rd) => rd,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(root = %root.display(), "Music root not found");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };

    let mut genres = Vec::new();
    for entry in readable(read_dir, root) {
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if validate_genre(&name).is_ok() {
            genres.push(name);
        }
    }
    genres.sort();
    Ok(genres)
}

fn scan_tracks(dir: &Path) -> io::Result<Vec<Track>> {
    let mut tracks = Vec::new();
    for entry in readable(std::fs::read_dir(dir)?, dir) {
        let path = entry.path();
        let is_mp3 = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TRACK_EXTENSION));
        if !is_mp3 || !path.is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        match parse_track_key(&file_name) {
            Some(key) => tracks.push(Track {
                key,
                file_name,
                path,
            }),
            None => debug!(file = %path.display(), "Skipping track without numeric prefix"),
        }
    }

    // Total order: numeric key, then file name ("01.mp3" before "1.mp3")
    tracks.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.file_name.cmp(&b.file_name)));
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const INTERVAL: Duration = Duration::from_secs(30);

    fn music_root(genres: &[(&str, &[&str])]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (genre, files) in genres {
            let genre_dir = dir.path().join(genre);
            fs::create_dir_all(&genre_dir).unwrap();
            for file in *files {
                fs::write(genre_dir.join(file), file.as_bytes()).unwrap();
            }
        }
        dir
    }

    fn names(tracks: &TrackList) -> Vec<&str> {
        tracks.iter().map(|t| t.file_name()).collect()
    }

    #[test]
    fn test_parse_track_key() {
        assert_eq!(parse_track_key("12.mp3"), Some(12));
        assert_eq!(parse_track_key("007-remix.mp3"), Some(7));
        assert_eq!(parse_track_key("0.mp3"), Some(0));
        assert_eq!(parse_track_key("intro.mp3"), None);
        assert_eq!(parse_track_key(".mp3"), None);
        assert_eq!(parse_track_key("99999999999999999999999.mp3"), None);
    }

    #[test]
    fn test_validate_genre() {
        assert!(validate_genre("ambient").is_ok());
        assert!(validate_genre("lo-fi hip hop").is_ok());
        assert!(validate_genre("").is_err());
        assert!(validate_genre("..").is_err());
        assert!(validate_genre(".hidden").is_err());
        assert!(validate_genre("a/b").is_err());
        assert!(validate_genre("a\\b").is_err());
        assert!(validate_genre("x..y").is_err());
    }

    #[test]
    fn test_unreadable_entries_are_skipped() {
        let entries = vec![
            Ok("ambient"),
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Ok("jazz"),
        ];
        let kept: Vec<_> = readable(entries.into_iter(), Path::new("music")).collect();
        assert_eq!(kept, vec!["ambient", "jazz"]);
    }

    #[tokio::test]
    async fn test_tracks_sorted_numerically() {
        let root = music_root(&[(
            "ambient",
            &["10.mp3", "2.mp3", "1.mp3", "cover.jpg", "notes.txt", "intro.mp3", "3.MP3"],
        )]);
        let catalog = Catalog::new(root.path(), INTERVAL);

        let tracks = catalog.list_tracks("ambient").await;
        assert_eq!(names(&tracks), vec!["1.mp3", "2.mp3", "3.MP3", "10.mp3"]);
        assert_eq!(tracks[3].key(), 10);
        assert_eq!(tracks[0].path(), root.path().join("ambient").join("1.mp3"));
    }

    #[tokio::test]
    async fn test_colliding_keys_are_ordered_by_name() {
        let root = music_root(&[("jazz", &["1.mp3", "01.mp3", "1b.mp3"])]);
        let catalog = Catalog::new(root.path(), INTERVAL);

        let tracks = catalog.list_tracks("jazz").await;
        assert_eq!(names(&tracks), vec!["01.mp3", "1.mp3", "1b.mp3"]);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_genre_is_empty() {
        let root = music_root(&[("ambient", &["1.mp3"])]);
        let catalog = Catalog::new(root.path(), INTERVAL);

        assert!(catalog.list_tracks("unknown-genre").await.is_empty());
        assert!(catalog.list_tracks("..").await.is_empty());
        assert!(catalog.list_tracks("").await.is_empty());
        assert!(catalog.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_genres_are_subdirectories() {
        let root = music_root(&[("rock", &[]), ("ambient", &["1.mp3"]), (".git", &[])]);
        fs::write(root.path().join("readme.txt"), "x").unwrap();
        let catalog = Catalog::new(root.path(), INTERVAL);

        assert_eq!(catalog.list_genres().await.unwrap(), vec!["ambient", "rock"]);

        // The genre set is never cached
        fs::create_dir(root.path().join("jazz")).unwrap();
        assert_eq!(
            catalog.list_genres().await.unwrap(),
            vec!["ambient", "jazz", "rock"]
        );
    }

    #[tokio::test]
    async fn test_missing_root_has_no_genres() {
        let root = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(root.path().join("nope"), INTERVAL);
        assert!(catalog.list_genres().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_is_stable_within_interval() {
        let root = music_root(&[("ambient", &["1.mp3", "2.mp3"])]);
        let catalog = Catalog::new(root.path(), INTERVAL);

        let first = catalog.list_tracks("ambient").await;
        fs::write(root.path().join("ambient/3.mp3"), "3").unwrap();
        fs::remove_file(root.path().join("ambient/1.mp3")).unwrap();

        tokio::time::advance(INTERVAL - Duration::from_millis(1)).await;
        let second = catalog.list_tracks("ambient").await;
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_refreshes_once_after_interval() {
        let root = music_root(&[("ambient", &["1.mp3", "2.mp3"])]);
        let catalog = Catalog::new(root.path(), INTERVAL);

        let before = catalog.list_tracks("ambient").await;
        fs::write(root.path().join("ambient/3.mp3"), "3").unwrap();

        tokio::time::advance(INTERVAL).await;
        let refreshed = catalog.list_tracks("ambient").await;
        assert_eq!(names(&before), vec!["1.mp3", "2.mp3"]);
        assert_eq!(names(&refreshed), vec!["1.mp3", "2.mp3", "3.mp3"]);

        // The refresh restarts the interval: no second scan
        fs::write(root.path().join("ambient/4.mp3"), "4").unwrap();
        let again = catalog.list_tracks("ambient").await;
        assert!(Arc::ptr_eq(&refreshed, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_genre_becomes_empty_on_refresh() {
        let root = music_root(&[("ambient", &["1.mp3"])]);
        let catalog = Catalog::new(root.path(), INTERVAL);

        assert_eq!(catalog.list_tracks("ambient").await.len(), 1);
        fs::remove_dir_all(root.path().join("ambient")).unwrap();

        assert_eq!(catalog.list_tracks("ambient").await.len(), 1);
        tokio::time::advance(INTERVAL).await;
        assert!(catalog.list_tracks("ambient").await.is_empty());
    }
}
