use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = "remotty",
    about = "Home media-library server: browse shows and drive mpv from a phone",
    long_about = None,
    version,
)]
pub struct Args {
    /// Library root: one sub-folder per show [default: ~/Anime]
    pub library: Option<PathBuf>,

    /// TCP port to listen on [default: 6786]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to TOML config file (overrides default search: ./remotty.toml, ~/.config/remotty/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds between library rescans [default: 60]
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Maximum number of commands handled at once [default: 8]
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Bind to localhost only (127.0.0.1) instead of all interfaces (0.0.0.0 + :::)
    #[arg(long)]
    pub localhost: bool,
}
