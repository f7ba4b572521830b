//! Catalog synchronization: periodically rescan the library root, diff the
//! show folders against the current snapshot, broadcast the delta and apply
//! it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use walkdir::WalkDir;

use crate::library::metadata::MetadataProvider;
use crate::protocol::{Message, Show, ShowFormat};
use crate::server::registry::{BroadcastReport, SessionRegistry};

/// Largest cover attached to a show. Every listing carries all covers, so
/// this keeps a full snapshot of a few hundred shows inside one frame.
pub const MAX_COVER_BYTES: usize = 64 * 1024;

/// Shows added and removed by one rescan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDelta {
    pub added: Vec<Show>,
    pub removed: Vec<Show>,
}

/// Name-level diff: `(new - old, old - new)`.
pub fn diff_names(old: &BTreeSet<String>, new: &BTreeSet<String>) -> (BTreeSet<String>, BTreeSet<String>) {
    let added = new.difference(old).cloned().collect();
    let removed = old.difference(new).cloned().collect();
    (added, removed)
}

/// Immediate subdirectories of `root`, keyed by folder name.
pub fn list_show_dirs(root: &Path) -> BTreeMap<String, PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Cannot access entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.into_path()))
        })
        .collect()
}

/// Owner of the authoritative show snapshot.
///
/// Directory listing and metadata lookups run without holding any lock;
/// only the final add/remove step takes the snapshot write lock. Rescans
/// themselves are serialized.
pub struct CatalogEngine {
    root: PathBuf,
    provider: Arc<dyn MetadataProvider>,
    registry: Arc<SessionRegistry>,
    snapshot: RwLock<BTreeMap<String, Show>>,
    rescan_lock: Mutex<()>,
}

impl CatalogEngine {
    pub fn new(
        root: impl Into<PathBuf>,
        provider: Arc<dyn MetadataProvider>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            root: root.into(),
            provider,
            registry,
            snapshot: RwLock::new(BTreeMap::new()),
            rescan_lock: Mutex::new(()),
        }
    }

    /// Current snapshot, ordered by name.
    pub fn snapshot(&self) -> Vec<Show> {
        self.snapshot
            .read()
            .expect("catalog snapshot lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Show> {
        self.snapshot
            .read()
            .expect("catalog snapshot lock poisoned")
            .get(name)
            .cloned()
    }

    fn names(&self) -> BTreeSet<String> {
        self.snapshot
            .read()
            .expect("catalog snapshot lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Rescan the library root once. When shows appeared or vanished, the
    /// delta is broadcast to every live session and then applied; otherwise
    /// nothing is sent and `None` is returned.
    pub async fn rescan(&self) -> Option<CatalogDelta> {
        let _serialized = self.rescan_lock.lock().await;
        let started = Instant::now();

        let root = self.root.clone();
        let dirs = match tokio::task::spawn_blocking(move || list_show_dirs(&root)).await {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::error!("Library scan of {} panicked: {}", self.root.display(), e);
                return None;
            }
        };

        let new_names: BTreeSet<String> = dirs.keys().cloned().collect();
        let (added_names, removed_names) = diff_names(&self.names(), &new_names);
        if added_names.is_empty() && removed_names.is_empty() {
            tracing::debug!("Rescan found no changes ({} shows)", new_names.len());
            return None;
        }

        // Existing entries are left as they are, so only new folders need
        // a metadata lookup.
        let mut added = Vec::with_capacity(added_names.len());
        for name in &added_names {
            if let Some(path) = dirs.get(name) {
                added.push(self.describe(name, path).await);
            }
        }
        let removed: Vec<Show> = {
            let snapshot = self.snapshot.read().expect("catalog snapshot lock poisoned");
            removed_names
                .iter()
                .filter_map(|name| snapshot.get(name).cloned())
                .collect()
        };

        let delta = CatalogDelta { added, removed };
        let report = self.publish(&delta).await;

        {
            let mut snapshot = self.snapshot.write().expect("catalog snapshot lock poisoned");
            for show in &delta.removed {
                snapshot.remove(&show.name);
            }
            for show in &delta.added {
                snapshot.insert(show.name.clone(), show.clone());
            }
        }

        tracing::info!(
            "Catalog updated: +{} -{} shows, delivered to {} sessions in {} ms",
            delta.added.len(),
            delta.removed.len(),
            report.delivered,
            started.elapsed().as_millis()
        );
        Some(delta)
    }

    async fn publish(&self, delta: &CatalogDelta) -> BroadcastReport {
        let message = Message::ShowsDelta {
            added: delta.added.clone(),
            removed: delta.removed.clone(),
        };
        self.registry.broadcast(&message).await
    }

    /// Build a `Show` for one folder. Metadata failures degrade to
    /// `UNKNOWN` without cover art.
    async fn describe(&self, name: &str, path: &Path) -> Show {
        let meta = match self.provider.lookup(name).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Metadata lookup failed for {}: {}", name, e);
                Default::default()
            }
        };

        let cover_art = match meta.cover_url.as_deref() {
            Some(url) => match self.provider.fetch_cover(name, url).await {
                Ok(bytes) if bytes.len() > MAX_COVER_BYTES => {
                    tracing::warn!(
                        "Cover art for {} is {} bytes, over the {} byte limit; dropping it",
                        name,
                        bytes.len(),
                        MAX_COVER_BYTES
                    );
                    None
                }
                Ok(bytes) if !bytes.is_empty() => Some(bytes),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Failed to fetch cover art for {}: {}", name, e);
                    None
                }
            },
            None => None,
        };

        Show {
            name: name.to_string(),
            root_path: path.to_string_lossy().into_owned(),
            cover_art,
            format: meta
                .format
                .as_deref()
                .map(ShowFormat::from_provider)
                .unwrap_or_default(),
        }
    }

    /// Rescan immediately, then every `interval`, until `shutdown` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.rescan().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Catalog: shutdown signal received");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diff_is_set_difference_both_ways() {
        let (added, removed) = diff_names(&set(&["A", "B", "C"]), &set(&["B", "C", "D"]));
        assert_eq!(added, set(&["D"]));
        assert_eq!(removed, set(&["A"]));
    }

    #[test]
    fn identical_sets_diff_to_nothing() {
        let (added, removed) = diff_names(&set(&["A"]), &set(&["A"]));
        assert!(added.is_empty() && removed.is_empty());
    }

    #[test]
    fn only_directories_are_shows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Naruto")).unwrap();
        std::fs::create_dir_all(dir.path().join("Bleach/Season 1")).unwrap();
        std::fs::write(dir.path().join("stray.mkv"), b"").unwrap();

        let shows = list_show_dirs(dir.path());
        assert_eq!(shows.keys().cloned().collect::<Vec<_>>(), vec!["Bleach", "Naruto"]);
    }
}
