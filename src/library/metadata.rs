//! Show metadata: cover art URL and format, looked up by folder name.
//!
//! The default provider reads a JSON catalog dump (a list of
//! `{titleRomanji, titleEnglish, coverImageUrl, format}` objects) from a local
//! cache file, downloading it once from a remote URL when the cache is absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::library::numbering::sanitize_file_name;
use crate::library::tools::{MediaTools, ToolError};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metadata cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata catalog is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cover conversion failed: {0}")]
    Convert(#[from] ToolError),
}

/// What the provider knows about one title. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowMetadata {
    pub cover_url: Option<String>,
    pub format: Option<String>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn lookup(&self, title: &str) -> Result<ShowMetadata, MetadataError>;

    /// Download the cover image at `url` for `show_name`.
    async fn fetch_cover(&self, show_name: &str, url: &str) -> Result<Vec<u8>, MetadataError>;
}

/// Provider that knows nothing. Every show ends up `UNKNOWN` without art.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

#[async_trait]
impl MetadataProvider for NoMetadata {
    async fn lookup(&self, _title: &str) -> Result<ShowMetadata, MetadataError> {
        Ok(ShowMetadata::default())
    }

    async fn fetch_cover(&self, _show_name: &str, _url: &str) -> Result<Vec<u8>, MetadataError> {
        Ok(Vec::new())
    }
}

/// One entry of the catalog dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title_romanji: Option<String>,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Catalog-file backed provider with an on-disk cover cache.
pub struct CatalogFileProvider {
    romaji: HashMap<String, ShowMetadata>,
    english: HashMap<String, ShowMetadata>,
    http: reqwest::Client,
    cover_dir: PathBuf,
    tools: MediaTools,
}

impl CatalogFileProvider {
    pub fn from_entries(entries: Vec<CatalogEntry>, cover_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let mut romaji = HashMap::new();
        let mut english = HashMap::new();
        for entry in entries {
            let meta = ShowMetadata {
                cover_url: entry.cover_image_url.filter(|u| !u.is_empty()),
                format: entry.format,
            };
            if let Some(title) = entry.title_romanji {
                romaji.insert(title.to_uppercase(), meta.clone());
            }
            if let Some(title) = entry.title_english {
                english.insert(title.to_uppercase(), meta);
            }
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            romaji,
            english,
            http,
            cover_dir: cover_dir.into(),
            tools: MediaTools::default(),
        }
    }

    /// Use `tools` to re-encode downloaded covers.
    pub fn with_tools(mut self, tools: MediaTools) -> Self {
        self.tools = tools;
        self
    }

    /// Load the catalog from `cache_path`, fetching it from `remote_url` and
    /// saving it there first when the file does not exist. Never fails: an
    /// unreachable catalog yields an empty provider.
    pub async fn load(cache_path: &Path, remote_url: &str, cover_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let entries = match load_or_fetch_catalog(cache_path, remote_url, timeout).await {
            Ok(entries) => {
                tracing::info!("Loaded {} catalog entries from {}", entries.len(), cache_path.display());
                entries
            }
            Err(e) => {
                tracing::warn!("Metadata catalog unavailable, continuing without it: {}", e);
                Vec::new()
            }
        };
        Self::from_entries(entries, cover_dir, timeout)
    }

    fn cover_path(&self, show_name: &str) -> PathBuf {
        self.cover_dir.join(format!("{}.webp", sanitize_file_name(show_name)))
    }
}

#[async_trait]
impl MetadataProvider for CatalogFileProvider {
    async fn lookup(&self, title: &str) -> Result<ShowMetadata, MetadataError> {
        let key = title.to_uppercase();
        let romaji = self.romaji.get(&key);
        let hit = match romaji {
            Some(meta) if meta.cover_url.is_some() => Some(meta),
            _ => self.english.get(&key).or(romaji),
        };
        Ok(hit.cloned().unwrap_or_default())
    }

    async fn fetch_cover(&self, show_name: &str, url: &str) -> Result<Vec<u8>, MetadataError> {
        let path = self.cover_path(show_name);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            return Ok(bytes);
        }

        tracing::info!("Downloading cover art for {}...", show_name);
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        // covers go out inside every show listing; keep only a small WebP
        tokio::fs::create_dir_all(&self.cover_dir).await?;
        let id = uuid::Uuid::new_v4();
        let download = self.cover_dir.join(format!(".{id}.download"));
        let converted = self.cover_dir.join(format!(".{id}.webp"));
        tokio::fs::write(&download, &bytes).await?;
        let shrunk = self.tools.shrink_cover(&download, &converted).await;
        let _ = tokio::fs::remove_file(&download).await;
        if let Err(e) = shrunk {
            let _ = tokio::fs::remove_file(&converted).await;
            return Err(e.into());
        }
        tokio::fs::rename(&converted, &path).await?;
        Ok(tokio::fs::read(&path).await?)
    }
}

async fn load_or_fetch_catalog(
    cache_path: &Path,
    remote_url: &str,
    timeout: Duration,
) -> Result<Vec<CatalogEntry>, MetadataError> {
    match tokio::fs::read(cache_path).await {
        Ok(raw) => return Ok(serde_json::from_slice(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    tracing::info!("Fetching metadata catalog from {}", remote_url);
    let raw = reqwest::Client::builder()
        .timeout(timeout)
        .build()?
        .get(remote_url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    let entries: Vec<CatalogEntry> = serde_json::from_slice(&raw)?;

    if let Some(parent) = cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(cache_path, &raw).await?;
    Ok(entries)
}
