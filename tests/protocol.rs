use bytes::{BufMut, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

use remotty::protocol::codec::{decode_payload, encode_payload};
use remotty::protocol::{
    Chapter, Episode, Message, MessageCodec, ProtocolError, Show, ShowFormat, Signal, SubtitleTrack,
};

/// Hand-build a frame with an arbitrary version byte and body.
fn raw_frame(version: u8, json: &[u8]) -> BytesMut {
    let len = u32::try_from(json.len() + 1).unwrap();
    let mut buf = BytesMut::new();
    buf.put_u32(len);
    buf.put_u8(version);
    buf.put_slice(json);
    buf
}

fn naruto() -> Show {
    Show {
        name: "Naruto".into(),
        root_path: "/lib/Naruto".into(),
        cover_art: Some(vec![0x89, b'P', b'N', b'G']),
        format: ShowFormat::Tv,
    }
}

// ── stream framing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn messages_survive_a_byte_stream_in_order() {
    let (client, server) = tokio::io::duplex(64);
    let mut tx = FramedWrite::new(client, MessageCodec::new());
    let mut rx = FramedRead::new(server, MessageCodec::new());

    let sent = vec![
        Message::command(Signal::SendEpisodes, "Naruto;1;6;DOWN"),
        Message::ShowsSnapshot { shows: vec![naruto()] },
        Message::EpisodeWindow {
            episodes: vec![Episode {
                relative_path: "Naruto - 01.mkv".into(),
                episode_number: 1,
                length_formatted: "23:40".into(),
                thumbnail: None,
            }],
            total_episodes: 220,
            start_index: 0,
        },
        Message::Details {
            subtitle_tracks: vec![SubtitleTrack { id: 1, title: "English".into(), lang: "eng".into() }],
            chapters: vec![Chapter { title: "Opening".into(), time: "00:00:00".into(), index: 0 }],
        },
        Message::KeepAlive { message: "ping".into(), timestamp_millis: 1_700_000_000_000 },
    ];

    let writer = {
        let sent = sent.clone();
        tokio::spawn(async move {
            for msg in sent {
                tx.send(msg).await.unwrap();
            }
        })
    };

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(rx.next().await.unwrap().unwrap());
    }
    writer.await.unwrap();
    assert_eq!(received, sent);
}

// ── envelope layout ───────────────────────────────────────────────────────────

#[test]
fn cover_art_travels_as_base64() {
    let payload = encode_payload(Message::ShowsDelta { added: vec![naruto()], removed: vec![] }).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&payload[1..]).unwrap();
    assert_eq!(json["signal"], "MODIFY_SHOWS");
    assert_eq!(json["kind"], "shows_delta");
    assert_eq!(json["added"][0]["cover_art"], "iVBORw==");
    assert_eq!(json["added"][0]["format"], "TV");
}

#[test]
fn missing_cover_is_null() {
    let mut show = naruto();
    show.cover_art = None;
    let payload = encode_payload(Message::ShowsSnapshot { shows: vec![show.clone()] }).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&payload[1..]).unwrap();
    assert!(json["shows"][0]["cover_art"].is_null());
    assert_eq!(
        decode_payload(&payload).unwrap(),
        Message::ShowsSnapshot { shows: vec![show] }
    );
}

#[test]
fn command_content_defaults_to_empty() {
    let mut payload = vec![1u8];
    payload.extend_from_slice(br#"{"signal":"SHOWS_LIST","kind":"command"}"#);
    assert_eq!(decode_payload(&payload).unwrap(), Message::command(Signal::ShowsList, ""));
}

// ── rejection ─────────────────────────────────────────────────────────────────

#[test]
fn reply_with_wrong_signal_is_a_protocol_error() {
    let mut codec = MessageCodec::new();
    let mut buf = raw_frame(1, br#"{"signal":"SEND_DETAILS","kind":"shows_snapshot","shows":[]}"#);
    assert!(matches!(
        codec.decode(&mut buf).unwrap_err(),
        ProtocolError::SignalMismatch(Signal::SendDetails)
    ));
}

#[test]
fn unknown_signal_is_a_protocol_error() {
    let mut codec = MessageCodec::new();
    let mut buf = raw_frame(1, br#"{"signal":"REWIND","kind":"command","content":""}"#);
    assert!(matches!(codec.decode(&mut buf).unwrap_err(), ProtocolError::Json(_)));
}

#[test]
fn garbage_is_a_protocol_error() {
    let mut codec = MessageCodec::new();
    let mut buf = raw_frame(1, b"not json");
    assert!(codec.decode(&mut buf).is_err());
}
