use std::path::{Path, PathBuf};

use rand::Rng;

use crate::library::numbering::{format_timestamp, sanitize_file_stem};
use crate::library::tools::MediaTools;

/// On-disk WebP thumbnail store keyed by the sanitized video base name.
/// Entries never expire.
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    dir: PathBuf,
}

impl ThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, video: &Path) -> PathBuf {
        let stem = sanitize_file_stem(&video.to_string_lossy());
        self.dir.join(format!("{stem}.webp"))
    }

    /// Return the cached thumbnail for `video`, extracting one first if the
    /// cache has none. Any failure is logged and yields `None`.
    pub async fn get_or_extract(
        &self,
        tools: &MediaTools,
        video: &Path,
        duration_secs: Option<u64>,
    ) -> Option<Vec<u8>> {
        let target = self.path_for(video);
        if let Ok(bytes) = tokio::fs::read(&target).await {
            return Some(bytes);
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!("Cannot create thumbnail dir {}: {}", self.dir.display(), e);
            return None;
        }

        let at = random_timestamp(duration_secs.unwrap_or(0));
        // Write to a private temp name first so a half-written file is never
        // picked up as a cache hit.
        let tmp = self
            .dir
            .join(format!(".{}.webp", uuid::Uuid::new_v4().simple()));
        let result = tools.extract_frame(video, &at, &tmp).await;
        if let Err(e) = result {
            tracing::warn!("Thumbnail extraction failed for {}: {}", video.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return None;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            tracing::warn!("Cannot store thumbnail {}: {}", target.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return None;
        }

        match tokio::fs::read(&target).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Cannot read thumbnail {}: {}", target.display(), e);
                None
            }
        }
    }
}

/// Uniformly random `HH:MM:SS` position inside a clip of `duration_secs`.
fn random_timestamp(duration_secs: u64) -> String {
    let at = if duration_secs == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..duration_secs)
    };
    format_timestamp(at)
}
