use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every operation the protocol knows about. Doubles as the discriminator on
/// replies: a reply carries the signal of the request it answers.
///
/// Wire names are SCREAMING_SNAKE_CASE and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Increase,
    Decrease,
    Play,
    PlayMovie,
    Mute,
    PlayOrPause,
    SeekForward,
    SeekBackward,
    ShowsList,
    ModifyShows,
    SendEpisodes,
    SendDetails,
    SkipChapter,
    PutSubs,
    Close,
    Exit,
    KeepAlive,
}

impl Signal {
    pub const ALL: [Signal; 17] = [
        Signal::Increase,
        Signal::Decrease,
        Signal::Play,
        Signal::PlayMovie,
        Signal::Mute,
        Signal::PlayOrPause,
        Signal::SeekForward,
        Signal::SeekBackward,
        Signal::ShowsList,
        Signal::ModifyShows,
        Signal::SendEpisodes,
        Signal::SendDetails,
        Signal::SkipChapter,
        Signal::PutSubs,
        Signal::Close,
        Signal::Exit,
        Signal::KeepAlive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Increase => "INCREASE",
            Signal::Decrease => "DECREASE",
            Signal::Play => "PLAY",
            Signal::PlayMovie => "PLAY_MOVIE",
            Signal::Mute => "MUTE",
            Signal::PlayOrPause => "PLAY_OR_PAUSE",
            Signal::SeekForward => "SEEK_FORWARD",
            Signal::SeekBackward => "SEEK_BACKWARD",
            Signal::ShowsList => "SHOWS_LIST",
            Signal::ModifyShows => "MODIFY_SHOWS",
            Signal::SendEpisodes => "SEND_EPISODES",
            Signal::SendDetails => "SEND_DETAILS",
            Signal::SkipChapter => "SKIP_CHAPTER",
            Signal::PutSubs => "PUT_SUBS",
            Signal::Close => "CLOSE",
            Signal::Exit => "EXIT",
            Signal::KeepAlive => "KEEP_ALIVE",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .iter()
            .copied()
            .find(|sig| sig.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Which way a client is paging through an episode list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrollDirection {
    Up,
    Down,
    None,
}

impl FromStr for ScrollDirection {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(ScrollDirection::Up),
            "DOWN" => Ok(ScrollDirection::Down),
            "NONE" => Ok(ScrollDirection::None),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown name: {0:?}")]
pub struct UnknownName(pub String);
