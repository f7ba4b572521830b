//! Message dispatcher: maps each inbound message to at most one reply or a
//! side effect on the library or the player.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::library::catalog::CatalogEngine;
use crate::library::episodes::EpisodeService;
use crate::player::bridge::{PlaybackBridge, PlayerError, SEEK_STEP_SECS};
use crate::protocol::{Message, ScrollDirection, Signal};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed {signal} content {content:?}: {reason}")]
    MalformedContent {
        signal: Signal,
        content: String,
        reason: String,
    },
    #[error("unknown show {0:?}")]
    UnknownShow(String),
    #[error("path {0:?} escapes the library root")]
    InvalidPath(String),
    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// What the session should do after a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(Message),
    NoReply,
    CloseSession,
}

/// Parsed `SEND_EPISODES` content: `show;startEpisode;pageSize;direction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRequest {
    pub show: String,
    pub start_episode: i64,
    pub page_size: usize,
    pub direction: ScrollDirection,
}

impl EpisodeRequest {
    /// The show name is everything before the last three fields, so names
    /// containing `;` survive.
    pub fn parse(content: &str) -> Result<Self, DispatchError> {
        let malformed = |reason: &str| DispatchError::MalformedContent {
            signal: Signal::SendEpisodes,
            content: content.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = content.rsplitn(4, ';');
        let direction = fields.next().ok_or_else(|| malformed("missing direction"))?;
        let page_size = fields.next().ok_or_else(|| malformed("missing page size"))?;
        let start_episode = fields.next().ok_or_else(|| malformed("missing start episode"))?;
        let show = fields.next().ok_or_else(|| malformed("missing show name"))?;

        Ok(Self {
            show: show.to_string(),
            start_episode: start_episode
                .trim()
                .parse()
                .map_err(|_| malformed("start episode is not an integer"))?,
            page_size: page_size
                .trim()
                .parse()
                .map_err(|_| malformed("page size is not a non-negative integer"))?,
            direction: direction
                .trim()
                .parse()
                .map_err(|_| malformed("direction must be UP, DOWN or NONE"))?,
        })
    }
}

/// Join `relative` onto `root`, refusing anything but plain path segments.
pub fn library_path(root: &Path, relative: &str) -> Result<PathBuf, DispatchError> {
    let rel = Path::new(relative);
    let plain = rel.components().all(|c| matches!(c, Component::Normal(_)));
    if relative.is_empty() || !plain {
        return Err(DispatchError::InvalidPath(relative.to_string()));
    }
    Ok(root.join(rel))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub struct Dispatcher {
    library_root: PathBuf,
    catalog: Arc<CatalogEngine>,
    episodes: Arc<EpisodeService>,
    player: Arc<PlaybackBridge>,
}

impl Dispatcher {
    pub fn new(
        library_root: impl Into<PathBuf>,
        catalog: Arc<CatalogEngine>,
        episodes: Arc<EpisodeService>,
        player: Arc<PlaybackBridge>,
    ) -> Self {
        Self {
            library_root: library_root.into(),
            catalog,
            episodes,
            player,
        }
    }

    pub fn player(&self) -> &Arc<PlaybackBridge> {
        &self.player
    }

    /// Handle one inbound message. Failures are logged and produce no reply;
    /// the session carries on.
    pub async fn dispatch(&self, message: Message) -> Outcome {
        let (signal, content) = match message {
            Message::Command { signal, content } => (signal, content),
            Message::KeepAlive { timestamp_millis, .. } => return Self::pong(timestamp_millis),
            other => {
                tracing::debug!("Ignoring client-sent {} reply", other.signal());
                return Outcome::NoReply;
            }
        };

        match self.handle(signal, &content).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("{} failed: {}", signal, e);
                Outcome::NoReply
            }
        }
    }

    async fn handle(&self, signal: Signal, content: &str) -> Result<Outcome, DispatchError> {
        match signal {
            Signal::ShowsList => Ok(self.shows_list()),
            Signal::SendEpisodes => self.send_episodes(content).await,
            Signal::SendDetails => Ok(self.send_details().await),
            Signal::Increase => self.effect(self.player.volume_up()).await,
            Signal::Decrease => self.effect(self.player.volume_down()).await,
            Signal::Mute => self.effect(self.player.mute()).await,
            Signal::PlayOrPause => self.effect(self.player.play_or_pause()).await,
            Signal::SeekForward => self.effect(self.player.seek(SEEK_STEP_SECS)).await,
            Signal::SeekBackward => self.effect(self.player.seek(-SEEK_STEP_SECS)).await,
            Signal::SkipChapter => self.skip_chapter(content).await,
            Signal::PutSubs => self.put_subs(content).await,
            Signal::Play => self.play(content).await,
            Signal::PlayMovie => self.play_movie(content).await,
            Signal::Close => {
                self.player.close().await;
                Ok(Outcome::NoReply)
            }
            Signal::Exit => Ok(Outcome::CloseSession),
            Signal::KeepAlive => Ok(Self::pong(now_millis())),
            Signal::ModifyShows => {
                tracing::debug!("Ignoring {} command", signal);
                Ok(Outcome::NoReply)
            }
        }
    }

    fn pong(timestamp_millis: i64) -> Outcome {
        Outcome::Reply(Message::KeepAlive {
            message: "pong".to_string(),
            timestamp_millis,
        })
    }

    async fn effect<F>(&self, action: F) -> Result<Outcome, DispatchError>
    where
        F: std::future::Future<Output = Result<(), PlayerError>>,
    {
        action.await?;
        Ok(Outcome::NoReply)
    }

    fn shows_list(&self) -> Outcome {
        Outcome::Reply(Message::ShowsSnapshot {
            shows: self.catalog.snapshot(),
        })
    }

    fn show_root(&self, name: &str) -> Result<PathBuf, DispatchError> {
        if let Some(show) = self.catalog.get(name) {
            return Ok(PathBuf::from(show.root_path));
        }
        // Folders created since the last rescan are still reachable.
        let root = library_path(&self.library_root, name)?;
        if root.is_dir() {
            Ok(root)
        } else {
            Err(DispatchError::UnknownShow(name.to_string()))
        }
    }

    async fn send_episodes(&self, content: &str) -> Result<Outcome, DispatchError> {
        let request = EpisodeRequest::parse(content)?;
        let root = self.show_root(&request.show)?;
        let window = self
            .episodes
            .window(&root, request.start_episode, request.page_size, request.direction)
            .await;
        Ok(Outcome::Reply(Message::EpisodeWindow {
            episodes: window.episodes,
            total_episodes: window.total_episodes,
            start_index: window.start_index,
        }))
    }

    async fn send_details(&self) -> Outcome {
        let subtitle_tracks = self.player.subtitle_tracks().await.unwrap_or_else(|e| {
            tracing::warn!("Subtitle track query failed: {}", e);
            Vec::new()
        });
        let chapters = self.player.chapters().await.unwrap_or_else(|e| {
            tracing::warn!("Chapter query failed: {}", e);
            Vec::new()
        });
        Outcome::Reply(Message::Details {
            subtitle_tracks,
            chapters,
        })
    }

    async fn skip_chapter(&self, content: &str) -> Result<Outcome, DispatchError> {
        let index = content.trim().parse().map_err(|_| DispatchError::MalformedContent {
            signal: Signal::SkipChapter,
            content: content.to_string(),
            reason: "chapter index is not a non-negative integer".to_string(),
        })?;
        self.effect(self.player.set_chapter(index)).await
    }

    async fn put_subs(&self, content: &str) -> Result<Outcome, DispatchError> {
        let id = match content.trim() {
            "no" => None,
            raw => Some(raw.parse().map_err(|_| DispatchError::MalformedContent {
                signal: Signal::PutSubs,
                content: content.to_string(),
                reason: "subtitle id is not an integer".to_string(),
            })?),
        };
        self.effect(self.player.set_subtitle(id)).await
    }

    async fn play(&self, content: &str) -> Result<Outcome, DispatchError> {
        let path = library_path(&self.library_root, content)?;
        self.player.play(&path).await?;
        Ok(Outcome::NoReply)
    }

    async fn play_movie(&self, content: &str) -> Result<Outcome, DispatchError> {
        let root = self.show_root(content)?;
        self.player.play_movie(&root).await?;
        Ok(Outcome::NoReply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_request_fields() {
        let req = EpisodeRequest::parse("Naruto;1;6;DOWN").unwrap();
        assert_eq!(
            req,
            EpisodeRequest {
                show: "Naruto".into(),
                start_episode: 1,
                page_size: 6,
                direction: ScrollDirection::Down,
            }
        );
    }

    #[test]
    fn show_name_may_contain_separator() {
        let req = EpisodeRequest::parse("Steins;Gate;12;6;UP").unwrap();
        assert_eq!(req.show, "Steins;Gate");
        assert_eq!(req.start_episode, 12);
    }

    #[test]
    fn malformed_episode_requests() {
        assert!(EpisodeRequest::parse("Naruto;1;6").is_err());
        assert!(EpisodeRequest::parse("Naruto;x;6;DOWN").is_err());
        assert!(EpisodeRequest::parse("Naruto;1;-6;DOWN").is_err());
        assert!(EpisodeRequest::parse("Naruto;1;6;SIDEWAYS").is_err());
    }

    #[test]
    fn library_paths_stay_inside_root() {
        let root = Path::new("/lib");
        assert_eq!(
            library_path(root, "Naruto/ep 01.mkv").unwrap(),
            PathBuf::from("/lib/Naruto/ep 01.mkv")
        );
        assert!(library_path(root, "../etc/passwd").is_err());
        assert!(library_path(root, "/etc/passwd").is_err());
        assert!(library_path(root, "Naruto/../../x").is_err());
        assert!(library_path(root, "").is_err());
    }
}
