//! Home media-library server: serve a folder-per-show library to remote
//! clients over a framed TCP protocol and drive a local mpv player.

pub mod cli;
pub mod config;
pub mod library;
pub mod player;
pub mod protocol;
pub mod server;
