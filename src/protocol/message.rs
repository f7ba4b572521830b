use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::signal::Signal;

/// Library classification reported by the metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowFormat {
    Tv,
    Movie,
    #[default]
    Unknown,
}

impl ShowFormat {
    /// Map a provider format string. Anything other than `TV`/`MOVIE`
    /// (e.g. `OVA`, `TV_SHORT`) is `Unknown`.
    pub fn from_provider(format: &str) -> Self {
        match format.trim().to_ascii_uppercase().as_str() {
            "TV" => ShowFormat::Tv,
            "MOVIE" => ShowFormat::Movie,
            _ => ShowFormat::Unknown,
        }
    }
}

/// One top-level folder in the library. Identity is `name`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub name: String,
    pub root_path: String,
    #[serde(with = "base64_bytes", default)]
    pub cover_art: Option<Vec<u8>>,
    #[serde(default)]
    pub format: ShowFormat,
}

impl fmt::Debug for Show {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Show")
            .field("name", &self.name)
            .field("root_path", &self.root_path)
            .field("cover_art", &self.cover_art.as_ref().map(Vec::len))
            .field("format", &self.format)
            .finish()
    }
}

/// One playable file inside a show.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Path relative to the show's root folder.
    pub relative_path: String,
    pub episode_number: u32,
    /// `MM:SS`, or `HH:MM:SS` once the clip reaches an hour.
    pub length_formatted: String,
    #[serde(with = "base64_bytes", default)]
    pub thumbnail: Option<Vec<u8>>,
}

impl fmt::Debug for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Episode")
            .field("relative_path", &self.relative_path)
            .field("episode_number", &self.episode_number)
            .field("length_formatted", &self.length_formatted)
            .field("thumbnail", &self.thumbnail.as_ref().map(Vec::len))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub id: i64,
    pub title: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Chapter start as `HH:MM:SS`.
    pub time: String,
    pub index: u32,
}

/// A protocol message, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client request. `content` holds signal-specific parameters.
    Command { signal: Signal, content: String },
    ShowsSnapshot { shows: Vec<Show> },
    /// Unsolicited broadcast after a rescan changed the catalog.
    ShowsDelta { added: Vec<Show>, removed: Vec<Show> },
    EpisodeWindow {
        episodes: Vec<Episode>,
        total_episodes: usize,
        start_index: usize,
    },
    Details {
        subtitle_tracks: Vec<SubtitleTrack>,
        chapters: Vec<Chapter>,
    },
    KeepAlive { message: String, timestamp_millis: i64 },
}

impl Message {
    pub fn command(signal: Signal, content: impl Into<String>) -> Self {
        Message::Command {
            signal,
            content: content.into(),
        }
    }

    /// The signal this message is tagged with on the wire.
    pub fn signal(&self) -> Signal {
        match self {
            Message::Command { signal, .. } => *signal,
            Message::ShowsSnapshot { .. } => Signal::ShowsList,
            Message::ShowsDelta { .. } => Signal::ModifyShows,
            Message::EpisodeWindow { .. } => Signal::SendEpisodes,
            Message::Details { .. } => Signal::SendDetails,
            Message::KeepAlive { .. } => Signal::KeepAlive,
        }
    }

    pub(crate) fn into_parts(self) -> (Signal, Body) {
        let signal = self.signal();
        let body = match self {
            Message::Command { content, .. } => Body::Command { content },
            Message::ShowsSnapshot { shows } => Body::ShowsSnapshot { shows },
            Message::ShowsDelta { added, removed } => Body::ShowsDelta { added, removed },
            Message::EpisodeWindow {
                episodes,
                total_episodes,
                start_index,
            } => Body::EpisodeWindow {
                episodes,
                total_episodes,
                start_index,
            },
            Message::Details {
                subtitle_tracks,
                chapters,
            } => Body::Details {
                subtitle_tracks,
                chapters,
            },
            Message::KeepAlive {
                message,
                timestamp_millis,
            } => Body::KeepAlive {
                message,
                timestamp_millis,
            },
        };
        (signal, body)
    }

    /// Rebuild a message from its wire parts. Returns `None` when the
    /// envelope signal contradicts the variant.
    pub(crate) fn from_parts(signal: Signal, body: Body) -> Option<Self> {
        let message = match body {
            Body::Command { content } => return Some(Message::Command { signal, content }),
            Body::ShowsSnapshot { shows } => Message::ShowsSnapshot { shows },
            Body::ShowsDelta { added, removed } => Message::ShowsDelta { added, removed },
            Body::EpisodeWindow {
                episodes,
                total_episodes,
                start_index,
            } => Message::EpisodeWindow {
                episodes,
                total_episodes,
                start_index,
            },
            Body::Details {
                subtitle_tracks,
                chapters,
            } => Message::Details {
                subtitle_tracks,
                chapters,
            },
            Body::KeepAlive {
                message,
                timestamp_millis,
            } => Message::KeepAlive {
                message,
                timestamp_millis,
            },
        };
        (message.signal() == signal).then_some(message)
    }
}

/// Variant payload as it appears on the wire, next to the envelope `signal`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Body {
    Command {
        #[serde(default)]
        content: String,
    },
    ShowsSnapshot {
        shows: Vec<Show>,
    },
    ShowsDelta {
        added: Vec<Show>,
        removed: Vec<Show>,
    },
    EpisodeWindow {
        episodes: Vec<Episode>,
        total_episodes: usize,
        start_index: usize,
    },
    Details {
        subtitle_tracks: Vec<SubtitleTrack>,
        chapters: Vec<Chapter>,
    },
    KeepAlive {
        message: String,
        timestamp_millis: i64,
    },
}

/// Optional byte fields travel as base64 strings (or `null`).
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_signals_are_fixed() {
        let window = Message::EpisodeWindow {
            episodes: vec![],
            total_episodes: 0,
            start_index: 0,
        };
        assert_eq!(window.signal(), Signal::SendEpisodes);
        assert_eq!(
            Message::ShowsDelta { added: vec![], removed: vec![] }.signal(),
            Signal::ModifyShows
        );
    }

    #[test]
    fn from_parts_rejects_mismatched_signal() {
        let (_, body) = Message::ShowsSnapshot { shows: vec![] }.into_parts();
        assert!(Message::from_parts(Signal::SendDetails, body).is_none());
    }

    #[test]
    fn provider_format_mapping() {
        assert_eq!(ShowFormat::from_provider("TV"), ShowFormat::Tv);
        assert_eq!(ShowFormat::from_provider("movie"), ShowFormat::Movie);
        assert_eq!(ShowFormat::from_provider("OVA"), ShowFormat::Unknown);
    }

    #[test]
    fn show_debug_hides_cover_bytes() {
        let show = Show {
            name: "Naruto".into(),
            root_path: "/lib/Naruto".into(),
            cover_art: Some(vec![0u8; 4096]),
            format: ShowFormat::Tv,
        };
        let dbg = format!("{show:?}");
        assert!(dbg.contains("Some(4096)"));
    }
}
