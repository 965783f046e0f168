//! Shared rotation clock.
//!
//! A single background task advances the "current track" of every genre once
//! per rotation interval, whether or not anybody is listening. All listeners
//! of a genre therefore hear the same track, like a broadcast radio.

use crate::catalog::Catalog;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-genre 1-based rotation indices.
///
/// Indices are created lazily (at 1) on first access, advanced only by the
/// [`RotationClock`] and read by the gateway.
#[derive(Debug, Default)]
pub struct RotationState {
    indices: RwLock<HashMap<String, usize>>,
}

impl RotationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored index of `genre`, creating it at 1 if unseen.
    pub async fn current(&self, genre: &str) -> usize {
        if let Some(index) = self.indices.read().await.get(genre) {
            return *index;
        }
        *self
            .indices
            .write()
            .await
            .entry(genre.to_string())
            .or_insert(1)
    }

    /// Position to play in a listing of `len` tracks, in `[1, len]`.
    ///
    /// When the listing shrank below the stored index, the index is wrapped
    /// into range for this read only.
    pub async fn position(&self, genre: &str, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let index = self.current(genre).await;
        Some((index - 1) % len + 1)
    }

    /// Advances `genre` by one position over `len` tracks, wrapping to 1.
    ///
    /// The read-modify-write happens under the write lock: concurrent
    /// advances of the same genre are serialised.
    pub async fn advance(&self, genre: &str, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let mut indices = self.indices.write().await;
        let index = indices.entry(genre.to_string()).or_insert(1);
        *index = (*index % len) + 1;
        Some(*index)
    }

    pub async fn snapshot(&self) -> HashMap<String, usize> {
        self.indices.read().await.clone()
    }
}

/// Advances every non-empty genre once per interval.
#[derive(Debug, Clone)]
pub struct RotationClock {
    catalog: Arc<Catalog>,
    state: Arc<RotationState>,
    interval: Duration,
}

impl RotationClock {
    pub fn new(catalog: Arc<Catalog>, state: Arc<RotationState>, interval: Duration) -> Self {
        Self {
            catalog,
            state,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one rotation step and returns the number of genres advanced.
    ///
    /// A genre whose listing is empty (missing, unreadable, no mp3) is
    /// skipped without affecting the others.
    pub async fn tick(&self) -> usize {
        let genres = match self.catalog.list_genres().await {
            Ok(genres) => genres,
            Err(err) => {
                warn!("Rotation tick skipped, cannot list genres: {}", err);
                return 0;
            }
        };

        let mut advanced = 0;
        for genre in genres {
            let tracks = self.catalog.list_tracks(&genre).await;
            if let Some(index) = self.state.advance(&genre, tracks.len()).await {
                debug!(genre = %genre, index, tracks = tracks.len(), "Rotation advanced");
                advanced += 1;
            }
        }
        advanced
    }

    /// Spawns the clock; it stops when `token` is cancelled.
    ///
    /// The first advance happens one full interval after the start. A tick
    /// already running when the token is cancelled is allowed to finish.
    pub fn spawn(self, token: CancellationToken) -> RotationHandle {
        let task_token = token.clone();
        let join = tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs_f64(), "Rotation clock started");
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }

            info!("Rotation clock stopped");
        });

        RotationHandle { token, join }
    }
}

/// Handle on the spawned rotation task.
#[derive(Debug)]
pub struct RotationHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl RotationHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancels the clock and waits for the task to release its timer.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.join.await {
            if !err.is_cancelled() {
                error!("Rotation task failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_unseen_genre_starts_at_one() {
        let state = RotationState::new();
        assert_eq!(state.current("ambient").await, 1);
        assert_eq!(state.position("ambient", 3).await, Some(1));
        assert_eq!(state.snapshot().await.get("ambient"), Some(&1));
    }

    #[tokio::test]
    async fn test_advance_wraps() {
        let state = RotationState::new();
        assert_eq!(state.advance("ambient", 3).await, Some(2));
        assert_eq!(state.advance("ambient", 3).await, Some(3));
        assert_eq!(state.advance("ambient", 3).await, Some(1));
        assert_eq!(state.advance("ambient", 0).await, None);
        assert_eq!(state.current("ambient").await, 1);
    }

    #[tokio::test]
    async fn test_cycle_returns_to_start() {
        let state = RotationState::new();
        for k in 1..=7 {
            let genre = format!("g{}", k);
            state.advance(&genre, k).await;
            let start = state.current(&genre).await;
            for _ in 0..k {
                state.advance(&genre, k).await;
            }
            assert_eq!(state.current(&genre).await, start, "k = {}", k);
        }
    }

    #[tokio::test]
    async fn test_position_wraps_after_shrink() {
        let state = RotationState::new();
        for _ in 0..4 {
            state.advance("rock", 5).await;
        }
        assert_eq!(state.current("rock").await, 5);
        assert_eq!(state.position("rock", 3).await, Some(2));
        assert_eq!(state.position("rock", 0).await, None);
        // Reading does not change the stored index
        assert_eq!(state.current("rock").await, 5);
    }

    #[tokio::test]
    async fn test_concurrent_advances_are_not_lost() {
        let state = Arc::new(RotationState::new());
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move { state.advance("ambient", 1000).await }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(state.current("ambient").await, 21);
    }

    #[tokio::test]
    async fn test_tick_isolates_empty_genres() {
        let root = tempfile::tempdir().unwrap();
        for (genre, count) in [("ambient", 3), ("empty", 0), ("jazz", 2)] {
            let dir = root.path().join(genre);
            fs::create_dir_all(&dir).unwrap();
            for i in 1..=count {
                fs::write(dir.join(format!("{}.mp3", i)), "x").unwrap();
            }
        }
        let catalog = Arc::new(Catalog::new(root.path(), Duration::from_secs(30)));
        let state = Arc::new(RotationState::new());
        let clock = RotationClock::new(catalog, state.clone(), Duration::from_secs(30));

        assert_eq!(clock.tick().await, 2);
        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.get("ambient"), Some(&2));
        assert_eq!(snapshot.get("jazz"), Some(&2));
        assert_eq!(snapshot.get("empty"), None);

        assert_eq!(clock.tick().await, 2);
        assert_eq!(state.current("jazz").await, 1);
    }

    #[tokio::test]
    async fn test_tick_without_music_root() {
        let root = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new(root.path().join("missing"), Duration::from_secs(30)));
        let clock = RotationClock::new(catalog, Arc::new(RotationState::new()), Duration::from_secs(30));
        assert_eq!(clock.tick().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_task() {
        let root = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new(root.path(), Duration::from_secs(30)));
        let clock = RotationClock::new(catalog, Arc::new(RotationState::new()), Duration::from_secs(30));

        let token = CancellationToken::new();
        let handle = clock.spawn(token.clone());
        assert!(!handle.is_finished());

        handle.stop().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_clock() {
        let root = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new(root.path(), Duration::from_secs(30)));
        let clock = RotationClock::new(catalog, Arc::new(RotationState::new()), Duration::from_secs(30));

        let parent = CancellationToken::new();
        let handle = clock.spawn(parent.child_token());
        parent.cancel();

        // stop only joins the already cancelled task
        handle.stop().await;
    }
}
