//! Fan-out of chat lines to every active session.

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::history::MessageLog;

pub type SessionId = u64;

/// Sending half of a session's outbound queue.
///
/// The session task owns the receiver and is the only writer to its
/// transport, so lines queued here reach the client in order.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Owns the broadcast set and the message log.
///
/// Delivery and the log append for one message happen under the same lock,
/// which makes the log order identical to the delivery order even when many
/// sessions broadcast at once. The lock is never held across an `.await`.
pub struct Broadcaster {
    sessions: Mutex<HashMap<SessionId, Outbound>>,
    log: Arc<dyn MessageLog>,
}

impl Broadcaster {
    pub fn new(log: Arc<dyn MessageLog>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Adds a session to the set; later broadcasts reach it.
    pub fn join(&self, id: SessionId, outbound: Outbound) {
        self.lock().insert(id, outbound);
    }

    /// Removes a session. Returns whether it was present.
    pub fn leave(&self, id: SessionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delivers `message` to every session in the set, then appends it to
    /// the log. Returns how many sessions it was delivered to.
    ///
    /// A session whose queue is closed is dropped from the set without
    /// affecting the others. A failed append is reported and swallowed:
    /// live clients matter more than durability.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut sessions = self.lock();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, outbound) in sessions.iter() {
            match outbound.send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(*id),
            }
        }
        for id in closed {
            debug!(session = id, "dropping session with closed outbound queue");
            sessions.remove(&id);
        }

        if let Err(err) = self.log.append(message) {
            error!(error = ?err, "failed to persist broadcast message");
        }

        delivered
    }

    /// Full message history for a replay request.
    pub fn history(&self) -> io::Result<Vec<String>> {
        self.log.read_all()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Outbound>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
