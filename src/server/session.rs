//! One client connection: a sequential frame reader feeding the worker pool,
//! and a writer task draining the session's outbox.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::protocol::{Message, MessageCodec, ProtocolError};
use crate::server::dispatch::{Dispatcher, Outcome};
use crate::server::pool::WorkerPool;
use crate::server::registry::{SessionHandle, SessionId, SessionRegistry};

/// Everything a session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub pool: WorkerPool,
    /// Close the session when no frame arrives for this long.
    pub idle_timeout: Duration,
}

/// Upper bound on flushing queued messages once a session is closing.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Serve `stream` until the client leaves, sends EXIT, goes idle, sends a
/// malformed frame, or the server shuts down.
pub async fn run_session(stream: TcpStream, peer: Option<SocketAddr>, ctx: SessionContext) {
    let (handle, outbox) = SessionHandle::new(peer);
    let id = handle.id();
    let shutdown = handle.shutdown_token();
    if !ctx.registry.register(handle.clone()) {
        tracing::debug!("Dropping connection from {:?} during shutdown", peer);
        return;
    }
    tracing::info!("Session {} opened for {:?}", id, peer);

    let (reader, writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, MessageCodec::new());
    let sink = FramedWrite::new(writer, MessageCodec::new());
    let writer_task = tokio::spawn(write_loop(id, sink, outbox, shutdown.clone()));

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = tokio::time::timeout(ctx.idle_timeout, frames.next()) => next,
        };

        let message = match next {
            Err(_) => {
                tracing::info!("Session {} idle for {:?}, closing", id, ctx.idle_timeout);
                break;
            }
            Ok(None) => {
                tracing::debug!("Session {} reached EOF", id);
                break;
            }
            Ok(Some(Err(e))) => {
                tracing::warn!("Session {} protocol error: {}", id, e);
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        tracing::debug!("Session {} received {}", id, message.signal());
        let job = handle_message(ctx.clone(), handle.clone(), message);
        let spawned = tokio::select! {
            _ = shutdown.cancelled() => break,
            spawned = ctx.pool.spawn(job) => spawned,
        };
        if spawned.is_none() {
            break;
        }
    }

    ctx.registry.close(id);
    if let Err(e) = writer_task.await {
        tracing::warn!("Session {} writer task failed: {}", id, e);
    }
    tracing::info!("Session {} closed", id);
}

async fn handle_message(ctx: SessionContext, handle: SessionHandle, message: Message) {
    match ctx.dispatcher.dispatch(message).await {
        Outcome::Reply(reply) => match handle.try_send(reply) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Session {} is not reading its replies, closing", handle.id());
                ctx.registry.close(handle.id());
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Session {} gone before reply was queued", handle.id());
            }
        },
        Outcome::CloseSession => {
            ctx.registry.close(handle.id());
        }
        Outcome::NoReply => {}
    }
}

/// Write queued messages until the session is cancelled, then flush what
/// is still queued and close the socket.
///
/// A message that cannot be encoded is dropped on its own; only a transport
/// failure ends the session.
async fn write_loop<S>(id: SessionId, mut sink: S, mut outbox: mpsc::Receiver<Message>, shutdown: CancellationToken)
where
    S: Sink<Message, Error = ProtocolError> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            message = outbox.recv() => {
                let Some(message) = message else { break };
                let signal = message.signal();
                let sent = tokio::select! {
                    sent = sink.send(message) => sent,
                    _ = shutdown.cancelled() => break,
                };
                match sent {
                    Ok(()) => {}
                    Err(e) if e.is_transport() => {
                        tracing::warn!("Session {} write failed: {}", id, e);
                        shutdown.cancel();
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("Session {} dropped {} reply: {}", id, signal, e);
                    }
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    outbox.close();
    let drain = async {
        while let Ok(message) = outbox.try_recv() {
            if let Err(e) = sink.feed(message).await {
                if e.is_transport() {
                    return;
                }
            }
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("Session {} close failed: {}", id, e);
        }
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, drain).await.is_err() {
        tracing::debug!("Session {} did not drain within {:?}", id, FLUSH_TIMEOUT);
    }
}
