//! Episode windowing: enumerate a show's video files, number them, and hand
//! out bounded slices with per-file metadata.
//!
//! Candidate files are ordered lexicographically by their show-relative path,
//! and the window arithmetic treats the Nth entry in that order as episode N.
//! The two agree only when file names are zero-padded consistently; the
//! returned episodes themselves are re-sorted by their parsed number.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::OnceCell;
use walkdir::WalkDir;

use crate::library::numbering::{episode_number, format_duration, is_episode};
use crate::library::thumbnails::ThumbnailCache;
use crate::library::tools::MediaTools;
use crate::protocol::{Episode, ScrollDirection};

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4"];

/// A resolved window, ready to be sent as an `EpisodeWindow` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeWindow {
    pub episodes: Vec<Episode>,
    pub total_episodes: usize,
    pub start_index: usize,
}

/// A video file that qualifies as an episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeFile {
    pub absolute: PathBuf,
    pub relative: String,
}

/// Compute `(start_index, end_index)` for a window request.
///
/// `start_index = clamp(start_episode - 1, 0, total)`; `end_index` moves
/// `page_size` away from it in the requested direction, clamped to
/// `[0, total]`. `None` leaves it equal to `start_index`.
pub fn window_bounds(
    start_episode: i64,
    page_size: usize,
    total: usize,
    direction: ScrollDirection,
) -> (usize, usize) {
    let start = start_episode.saturating_sub(1).clamp(0, total as i64) as usize;
    let end = match direction {
        ScrollDirection::Up => start.saturating_sub(page_size),
        ScrollDirection::Down => start.saturating_add(page_size).min(total),
        ScrollDirection::None => start,
    };
    (start, end)
}

/// Recursively list the episode files under `root`, sorted as strings.
pub fn list_episode_files(root: &Path) -> Vec<EpisodeFile> {
    let mut files: Vec<EpisodeFile> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Cannot access entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_video_extension(entry.path()))
        .filter_map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .ok()?
                .to_string_lossy()
                .into_owned();
            is_episode(&relative).then(|| EpisodeFile {
                absolute: entry.into_path(),
                relative,
            })
        })
        .collect();
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    files
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Episode windowing service for every show in the library.
///
/// Per-file metadata is memoized for the process lifetime, keyed by absolute
/// path. Concurrent first requests for the same file share one computation.
pub struct EpisodeService {
    tools: MediaTools,
    thumbnails: ThumbnailCache,
    cache: Mutex<HashMap<PathBuf, Arc<OnceCell<Episode>>>>,
}

impl EpisodeService {
    pub fn new(tools: MediaTools, thumbnails: ThumbnailCache) -> Self {
        Self {
            tools,
            thumbnails,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of files with memoized metadata.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().expect("episode cache lock poisoned").len()
    }

    pub async fn window(
        &self,
        show_root: &Path,
        start_episode: i64,
        page_size: usize,
        direction: ScrollDirection,
    ) -> EpisodeWindow {
        let started = Instant::now();

        let root = show_root.to_path_buf();
        let files = match tokio::task::spawn_blocking(move || list_episode_files(&root)).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!("Episode listing for {} panicked: {}", show_root.display(), e);
                Vec::new()
            }
        };
        let total_episodes = files.len();

        let (start_index, end_index) = window_bounds(start_episode, page_size, total_episodes, direction);
        let slice = &files[start_index.min(end_index)..start_index.max(end_index)];

        let mut episodes = join_all(slice.iter().map(|file| self.resolve(file))).await;
        episodes.sort_by_key(|ep| ep.episode_number);

        tracing::info!(
            "Loaded {} of {} episodes from {} in {} ms",
            episodes.len(),
            total_episodes,
            show_root.display(),
            started.elapsed().as_millis()
        );

        EpisodeWindow {
            episodes,
            total_episodes,
            start_index,
        }
    }

    async fn resolve(&self, file: &EpisodeFile) -> Episode {
        let cell = {
            let mut cache = self.cache.lock().expect("episode cache lock poisoned");
            Arc::clone(cache.entry(file.absolute.clone()).or_default())
        };
        cell.get_or_init(|| self.describe(file)).await.clone()
    }

    async fn describe(&self, file: &EpisodeFile) -> Episode {
        let duration = match self.tools.probe_duration(&file.absolute).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                tracing::warn!("Duration probe failed for {}: {}", file.absolute.display(), e);
                None
            }
        };
        let thumbnail = self
            .thumbnails
            .get_or_extract(&self.tools, &file.absolute, duration)
            .await;

        Episode {
            relative_path: file.relative.clone(),
            episode_number: episode_number(&file.relative).unwrap_or_default(),
            length_formatted: duration.map(format_duration).unwrap_or_default(),
            thumbnail,
        }
    }
}
