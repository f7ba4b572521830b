pub mod bridge;
pub mod ipc;

pub use bridge::{PlaybackBridge, PlayerError, PlayerSettings};
pub use ipc::{IpcError, MpvCommand, MpvResponse};
