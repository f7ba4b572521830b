//! Playback command bridge: owns the single external player process, talks to
//! it over its control socket and drives the OS mixer for volume.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::library::numbering::format_timestamp;
use crate::library::tools::{run_tool, ToolError};
use crate::player::ipc::{self, IpcError, MpvCommand, MpvResponse};
use crate::protocol::{Chapter, SubtitleTrack};

/// Volume step handed to the mixer.
const VOLUME_STEP: &str = "5%";
/// Seek step in seconds.
pub const SEEK_STEP_SECS: i64 = 10;

const MOVIE_EXTENSIONS: &[&str] = &["mkv", "mp4"];

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("failed to start player {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no video file under {0}")]
    NoVideo(PathBuf),
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error("mixer command failed: {0}")]
    Mixer(#[from] ToolError),
    #[error("player returned unexpected {property}: {detail}")]
    UnexpectedReply { property: &'static str, detail: String },
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub mpv_path: PathBuf,
    pub ipc_socket: PathBuf,
    pub mixer_path: PathBuf,
    /// Limit for mixer invocations.
    pub tool_timeout: Duration,
    /// Limit for one control-socket round trip.
    pub ipc_timeout: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            mpv_path: PathBuf::from("mpv"),
            ipc_socket: PathBuf::from("/tmp/mpvsocket"),
            mixer_path: PathBuf::from("amixer"),
            tool_timeout: Duration::from_secs(30),
            ipc_timeout: Duration::from_secs(5),
        }
    }
}

/// At most one player process is alive at a time; launching a new one kills
/// and reaps the previous one first.
pub struct PlaybackBridge {
    settings: PlayerSettings,
    child: Mutex<Option<Child>>,
}

impl PlaybackBridge {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            settings,
            child: Mutex::new(None),
        }
    }

    /// Replace whatever is playing with `path`, full-screen. Returns the new
    /// process id.
    pub async fn play(&self, path: &Path) -> Result<Option<u32>, PlayerError> {
        let mut slot = self.child.lock().await;
        if let Some(previous) = slot.take() {
            terminate(previous).await;
        }

        let program = &self.settings.mpv_path;
        let child = Command::new(program)
            .arg("--fs")
            .arg("--fs-screen=1")
            .arg(format!("--input-ipc-server={}", self.settings.ipc_socket.display()))
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlayerError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        tracing::info!("Playing {} (pid {:?})", path.display(), pid);
        *slot = Some(child);
        Ok(pid)
    }

    /// Play the first video file found under `show_root`.
    pub async fn play_movie(&self, show_root: &Path) -> Result<Option<u32>, PlayerError> {
        let root = show_root.to_path_buf();
        let found = tokio::task::spawn_blocking(move || first_video(&root))
            .await
            .ok()
            .flatten();
        match found {
            Some(video) => self.play(&video).await,
            None => Err(PlayerError::NoVideo(show_root.to_path_buf())),
        }
    }

    /// Kill the active player, if any.
    pub async fn close(&self) -> bool {
        match self.child.lock().await.take() {
            Some(child) => {
                terminate(child).await;
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        let mut slot = self.child.lock().await;
        match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, PlayerError> {
        tracing::debug!("Player command {:?}", cmd.command);
        Ok(ipc::request(&self.settings.ipc_socket, &cmd, self.settings.ipc_timeout).await?)
    }

    pub async fn play_or_pause(&self) -> Result<(), PlayerError> {
        self.send(MpvCommand::cycle("pause")).await.map(drop)
    }

    pub async fn seek(&self, seconds: i64) -> Result<(), PlayerError> {
        self.send(MpvCommand::seek_relative(seconds)).await.map(drop)
    }

    /// Select subtitle track `id`, or disable subtitles with `None`.
    pub async fn set_subtitle(&self, id: Option<i64>) -> Result<(), PlayerError> {
        let value = match id {
            Some(id) => Value::from(id),
            None => Value::from("no"),
        };
        self.send(MpvCommand::set_property("sid", value)).await.map(drop)
    }

    pub async fn set_chapter(&self, index: u32) -> Result<(), PlayerError> {
        self.send(MpvCommand::set_property("chapter", index)).await.map(drop)
    }

    pub async fn volume_up(&self) -> Result<(), PlayerError> {
        self.mixer(&format!("{VOLUME_STEP}+")).await
    }

    pub async fn volume_down(&self) -> Result<(), PlayerError> {
        self.mixer(&format!("{VOLUME_STEP}-")).await
    }

    pub async fn mute(&self) -> Result<(), PlayerError> {
        self.mixer("toggle").await
    }

    async fn mixer(&self, value: &str) -> Result<(), PlayerError> {
        run_tool(
            &self.settings.mixer_path,
            ["-q", "set", "Master", value],
            self.settings.tool_timeout,
        )
        .await?;
        Ok(())
    }

    pub async fn subtitle_tracks(&self) -> Result<Vec<SubtitleTrack>, PlayerError> {
        let response = self.send(MpvCommand::get_property("track-list")).await?;
        parse_subtitle_tracks(response.data.unwrap_or(Value::Null))
    }

    pub async fn chapters(&self) -> Result<Vec<Chapter>, PlayerError> {
        let response = self.send(MpvCommand::get_property("chapter-list")).await?;
        parse_chapters(response.data.unwrap_or(Value::Null))
    }
}

async fn terminate(mut child: Child) {
    let pid = child.id();
    match child.kill().await {
        Ok(()) => tracing::info!("Stopped player (pid {:?})", pid),
        Err(e) => tracing::warn!("Failed to stop player (pid {:?}): {}", pid, e),
    }
}

/// First `mkv`/`mp4` under `dir`, in file-name order.
pub fn first_video(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| MOVIE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
}

/// Subtitle entries of an mpv `track-list`.
pub fn parse_subtitle_tracks(data: Value) -> Result<Vec<SubtitleTrack>, PlayerError> {
    let Value::Array(tracks) = data else {
        return Err(PlayerError::UnexpectedReply {
            property: "track-list",
            detail: data.to_string(),
        });
    };
    Ok(tracks
        .iter()
        .filter(|t| t.get("type").and_then(Value::as_str) == Some("sub"))
        .filter_map(|t| {
            let id = t.get("id").and_then(Value::as_i64)?;
            Some(SubtitleTrack {
                id,
                title: t
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Track {id}")),
                lang: t
                    .get("lang")
                    .and_then(Value::as_str)
                    .unwrap_or("und")
                    .to_string(),
            })
        })
        .collect())
}

/// Entries of an mpv `chapter-list`, numbered from zero in list order.
pub fn parse_chapters(data: Value) -> Result<Vec<Chapter>, PlayerError> {
    let Value::Array(chapters) = data else {
        return Err(PlayerError::UnexpectedReply {
            property: "chapter-list",
            detail: data.to_string(),
        });
    };
    Ok(chapters
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let seconds = c.get("time").and_then(Value::as_f64).unwrap_or(0.0).max(0.0);
            Chapter {
                title: c
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Chapter {}", i + 1)),
                time: format_timestamp(seconds as u64),
                index: i as u32,
            }
        })
        .collect())
}
