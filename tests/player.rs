#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use remotty::player::{IpcError, PlaybackBridge, PlayerError, PlayerSettings};
use remotty::protocol::SubtitleTrack;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings(dir: &Path) -> PlayerSettings {
    PlayerSettings {
        mpv_path: script(dir, "mpv", "exec sleep 30"),
        ipc_socket: dir.join("mpvsocket"),
        mixer_path: script(dir, "amixer", &format!("echo \"$@\" >> {}", dir.join("mixer.log").display())),
        tool_timeout: Duration::from_secs(5),
        ipc_timeout: Duration::from_millis(500),
    }
}

fn alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Answer `connections` requests on `socket` the way mpv does: an unrelated
/// event line first, then the reply. Returns the commands received.
fn fake_mpv(socket: &Path, connections: usize) -> JoinHandle<Vec<Value>> {
    let listener = UnixListener::bind(socket).unwrap();
    tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let request: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

            let data = match request["command"][1].as_str() {
                Some("track-list") => json!([
                    {"id": 1, "type": "video"},
                    {"id": 1, "type": "sub", "lang": "eng", "title": "Dialogue"},
                    {"id": 2, "type": "sub", "lang": "jpn"},
                ]),
                Some("chapter-list") => json!([
                    {"title": "Intro", "time": 0.0},
                    {"time": 90.25},
                ]),
                _ => Value::Null,
            };
            let reply = json!({"error": "success", "data": data, "request_id": request["request_id"]});
            writer.write_all(b"{\"event\":\"playback-restart\"}\n").await.unwrap();
            writer.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            seen.push(request["command"].clone());
        }
        seen
    })
}

// ── process lifecycle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn play_replaces_the_running_player() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = PlaybackBridge::new(settings(dir.path()));

    let first = bridge.play(Path::new("/lib/Naruto/Naruto - 01.mkv")).await.unwrap().unwrap();
    assert!(alive(first));
    assert!(bridge.is_running().await);

    let second = bridge.play(Path::new("/lib/Naruto/Naruto - 02.mkv")).await.unwrap().unwrap();
    assert_ne!(first, second);
    assert!(!alive(first), "previous player must be gone before the next starts");
    assert!(alive(second));
    assert_eq!(bridge.pid().await, Some(second));

    assert!(bridge.close().await);
    assert!(!alive(second));
    assert!(!bridge.is_running().await);
    assert!(!bridge.close().await);
}

#[tokio::test]
async fn play_movie_picks_the_first_video() {
    let dir = tempfile::tempdir().unwrap();
    let movie = dir.path().join("Akira");
    std::fs::create_dir(&movie).unwrap();
    std::fs::write(movie.join("cover.jpg"), b"").unwrap();
    std::fs::write(movie.join("Akira (1988).mkv"), b"").unwrap();

    let bridge = PlaybackBridge::new(settings(dir.path()));
    assert!(bridge.play_movie(&movie).await.unwrap().is_some());
    bridge.close().await;

    let empty = dir.path().join("Empty");
    std::fs::create_dir(&empty).unwrap();
    assert!(matches!(bridge.play_movie(&empty).await, Err(PlayerError::NoVideo(_))));
}

#[tokio::test]
async fn missing_player_binary_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = PlaybackBridge::new(PlayerSettings {
        mpv_path: dir.path().join("no-such-mpv"),
        ..settings(dir.path())
    });
    let err = bridge.play(Path::new("/lib/x.mkv")).await.unwrap_err();
    assert!(matches!(err, PlayerError::Spawn { .. }));
    assert!(!bridge.is_running().await);
}

// ── mixer ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn volume_goes_through_the_mixer() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = PlaybackBridge::new(settings(dir.path()));

    bridge.volume_up().await.unwrap();
    bridge.volume_down().await.unwrap();
    bridge.mute().await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("mixer.log")).unwrap();
    assert_eq!(
        log.lines().collect::<Vec<_>>(),
        vec!["-q set Master 5%+", "-q set Master 5%-", "-q set Master toggle"]
    );
}

// ── control socket ────────────────────────────────────────────────────────────

#[tokio::test]
async fn transport_commands_reach_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let server = fake_mpv(&settings.ipc_socket, 5);
    let bridge = PlaybackBridge::new(settings);

    bridge.play_or_pause().await.unwrap();
    bridge.seek(10).await.unwrap();
    bridge.seek(-10).await.unwrap();
    bridge.set_subtitle(Some(2)).await.unwrap();
    bridge.set_chapter(3).await.unwrap();

    assert_eq!(
        server.await.unwrap(),
        vec![
            json!(["cycle", "pause"]),
            json!(["seek", 10, "relative"]),
            json!(["seek", -10, "relative"]),
            json!(["set_property", "sid", 2]),
            json!(["set_property", "chapter", 3]),
        ]
    );
}

#[tokio::test]
async fn details_queries_are_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let server = fake_mpv(&settings.ipc_socket, 2);
    let bridge = PlaybackBridge::new(settings);

    let tracks = bridge.subtitle_tracks().await.unwrap();
    assert_eq!(
        tracks,
        vec![
            SubtitleTrack { id: 1, title: "Dialogue".into(), lang: "eng".into() },
            SubtitleTrack { id: 2, title: "Track 2".into(), lang: "jpn".into() },
        ]
    );

    let chapters = bridge.chapters().await.unwrap();
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[1].title, "Chapter 2");
    assert_eq!(chapters[1].time, "00:01:30");
    server.await.unwrap();
}

#[tokio::test]
async fn silent_player_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let listener = UnixListener::bind(&settings.ipc_socket).unwrap();
    let _hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });
    let bridge = PlaybackBridge::new(settings);

    let err = bridge.play_or_pause().await.unwrap_err();
    assert!(matches!(err, PlayerError::Ipc(IpcError::Timeout(_))));
}

#[tokio::test]
async fn no_player_means_connect_error() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = PlaybackBridge::new(settings(dir.path()));
    let err = bridge.chapters().await.unwrap_err();
    assert!(matches!(err, PlayerError::Ipc(IpcError::Connect { .. })));
}
