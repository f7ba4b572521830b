use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use remotty::library::{CatalogEngine, EpisodeService, MediaTools, NoMetadata, ThumbnailCache};
use remotty::player::{PlaybackBridge, PlayerSettings};
use remotty::protocol::{Message, Signal};
use remotty::server::{Dispatcher, Outcome, SessionRegistry};

fn dispatcher(library: &Path, scratch: &Path) -> (Dispatcher, Arc<CatalogEngine>) {
    let catalog = Arc::new(CatalogEngine::new(
        library,
        Arc::new(NoMetadata),
        Arc::new(SessionRegistry::new()),
    ));
    let tools = MediaTools {
        ffprobe: scratch.join("no-ffprobe"),
        ffmpeg: scratch.join("no-ffmpeg"),
        timeout: Duration::from_secs(1),
    };
    let episodes = Arc::new(EpisodeService::new(tools, ThumbnailCache::new(scratch.join("thumbs"))));
    let player = Arc::new(PlaybackBridge::new(PlayerSettings {
        mpv_path: scratch.join("no-mpv"),
        ipc_socket: scratch.join("mpvsocket"),
        mixer_path: scratch.join("no-amixer"),
        tool_timeout: Duration::from_secs(1),
        ipc_timeout: Duration::from_millis(200),
    }));
    let dispatcher = Dispatcher::new(library, Arc::clone(&catalog), episodes, player);
    (dispatcher, catalog)
}

#[tokio::test]
async fn shows_list_is_always_the_full_snapshot() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    std::fs::create_dir(lib.path().join("Naruto")).unwrap();
    let (dispatcher, catalog) = dispatcher(lib.path(), scratch.path());

    assert_eq!(
        dispatcher.dispatch(Message::command(Signal::ShowsList, "")).await,
        Outcome::Reply(Message::ShowsSnapshot { shows: vec![] })
    );

    catalog.rescan().await;
    match dispatcher.dispatch(Message::command(Signal::ShowsList, "")).await {
        Outcome::Reply(Message::ShowsSnapshot { shows }) => assert_eq!(shows, catalog.snapshot()),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn keep_alive_command_answers_with_server_time() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let (dispatcher, _) = dispatcher(lib.path(), scratch.path());

    let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64;
    match dispatcher.dispatch(Message::command(Signal::KeepAlive, "")).await {
        Outcome::Reply(Message::KeepAlive { message, timestamp_millis }) => {
            assert_eq!(message, "pong");
            assert!(timestamp_millis >= before);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn exit_closes_the_session() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let (dispatcher, _) = dispatcher(lib.path(), scratch.path());
    assert_eq!(
        dispatcher.dispatch(Message::command(Signal::Exit, "")).await,
        Outcome::CloseSession
    );
}

#[tokio::test]
async fn player_commands_never_reply() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    std::fs::create_dir(lib.path().join("Akira")).unwrap();
    let (dispatcher, _) = dispatcher(lib.path(), scratch.path());

    for (signal, content) in [
        (Signal::Increase, ""),
        (Signal::Decrease, ""),
        (Signal::Mute, ""),
        (Signal::PlayOrPause, ""),
        (Signal::SeekForward, ""),
        (Signal::SeekBackward, ""),
        (Signal::SkipChapter, "2"),
        (Signal::PutSubs, "1"),
        (Signal::PutSubs, "no"),
        (Signal::Play, "Akira/Akira.mkv"),
        (Signal::PlayMovie, "Akira"),
        (Signal::Close, ""),
    ] {
        assert_eq!(
            dispatcher.dispatch(Message::command(signal, content)).await,
            Outcome::NoReply,
            "{signal} must not reply"
        );
    }
}

#[tokio::test]
async fn escaping_paths_never_reach_the_player() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let (dispatcher, _) = dispatcher(lib.path(), scratch.path());

    for content in ["../outside.mkv", "/etc/passwd"] {
        assert_eq!(
            dispatcher.dispatch(Message::command(Signal::Play, content)).await,
            Outcome::NoReply
        );
    }
    assert!(!dispatcher.player().is_running().await);
}

#[tokio::test]
async fn replies_sent_by_a_client_are_ignored() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let (dispatcher, _) = dispatcher(lib.path(), scratch.path());

    let stray = Message::ShowsDelta { added: vec![], removed: vec![] };
    assert_eq!(dispatcher.dispatch(stray).await, Outcome::NoReply);
    assert_eq!(
        dispatcher.dispatch(Message::command(Signal::ModifyShows, "")).await,
        Outcome::NoReply
    );
}

#[tokio::test]
async fn unknown_show_yields_no_window() {
    let lib = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let (dispatcher, _) = dispatcher(lib.path(), scratch.path());
    assert_eq!(
        dispatcher
            .dispatch(Message::command(Signal::SendEpisodes, "Nowhere;1;6;DOWN"))
            .await,
        Outcome::NoReply
    );
}
