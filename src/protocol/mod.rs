pub mod codec;
pub mod message;
pub mod signal;

pub use codec::{MessageCodec, ProtocolError};
pub use message::{Chapter, Episode, Message, Show, ShowFormat, SubtitleTrack};
pub use signal::{ScrollDirection, Signal};
