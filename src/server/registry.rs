use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::Message;

pub type SessionId = Uuid;

/// Capacity of a session's outbound queue.
pub const OUTBOX_CAPACITY: usize = 64;

/// How long a broadcast waits on one session's full outbox before skipping it.
const BROADCAST_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// The registry's view of one live session: an outbound queue drained by the
/// session's writer task, and a token that tells the session to shut down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    peer: Option<SocketAddr>,
    outbox: mpsc::Sender<Message>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Create a handle and the receiving end of its outbox.
    pub fn new(peer: Option<SocketAddr>) -> (Self, mpsc::Receiver<Message>) {
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let handle = Self {
            id: Uuid::new_v4(),
            peer,
            outbox,
            shutdown: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outbox.is_closed()
    }

    /// Queue a message for the writer task without waiting. A full outbox
    /// means the client stopped reading.
    pub fn try_send(&self, message: Message) -> Result<(), TrySendError<Message>> {
        if self.shutdown.is_cancelled() {
            return Err(TrySendError::Closed(message));
        }
        self.outbox.try_send(message)
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Sessions found closed and removed from the registry.
    pub pruned: usize,
    /// Live sessions whose outbox stayed full; they keep their registration.
    pub skipped: usize,
}

/// Live-session registry. Safe under concurrent register, close and
/// broadcast; no lock is held across an await.
///
/// After [`close_all`](Self::close_all) the registry stays closed: late
/// registrations are refused and their sessions cancelled on the spot.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live session. Returns `false`, and cancels the session, once
    /// the registry has been closed.
    pub fn register(&self, handle: SessionHandle) -> bool {
        let mut sessions = self.sessions.write().expect("session registry lock poisoned");
        if self.closed.load(Ordering::SeqCst) {
            handle.shutdown.cancel();
            tracing::debug!("Refusing session {} ({:?}): shutting down", handle.id, handle.peer);
            return false;
        }
        tracing::debug!("Registering session {} ({:?})", handle.id, handle.peer);
        sessions.insert(handle.id, handle);
        true
    }

    /// Remove a session and tell it to shut down. Idempotent: returns `true`
    /// only for the call that actually removed it.
    pub fn close(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .expect("session registry lock poisoned")
            .remove(&id);
        match removed {
            Some(handle) => {
                handle.shutdown.cancel();
                tracing::debug!("Session {} removed from registry", id);
                true
            }
            None => false,
        }
    }

    /// Close every session and refuse new ones from now on.
    pub fn close_all(&self) {
        let drained: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().expect("session registry lock poisoned");
            self.closed.store(true, Ordering::SeqCst);
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            handle.shutdown.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .contains_key(&id)
    }

    fn handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .expect("session registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Send `message` to every live session. Closed sessions are skipped
    /// during the pass and pruned afterwards.
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for handle in self.handles() {
            if handle.is_closed() {
                dead.push(handle.id);
                continue;
            }
            match handle
                .outbox
                .send_timeout(message.clone(), BROADCAST_SEND_TIMEOUT)
                .await
            {
                Ok(()) => report.delivered += 1,
                Err(SendTimeoutError::Closed(_)) => dead.push(handle.id),
                Err(SendTimeoutError::Timeout(_)) => {
                    tracing::warn!("Session {} outbox full, skipping broadcast", handle.id);
                    report.skipped += 1;
                }
            }
        }

        for id in dead {
            if self.close(id) {
                report.pruned += 1;
            }
        }

        tracing::debug!("Broadcast {}: {:?}", message.signal(), report);
        report
    }
}
