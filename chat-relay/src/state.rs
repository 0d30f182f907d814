use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    broadcast::{Broadcaster, SessionId},
    history::MessageLog,
    registry::NicknameRegistry,
};

/// Components shared by every session of one relay.
///
/// Handed to each session task behind an `Arc`; there is no global state.
pub struct RelayState {
    pub registry: NicknameRegistry,
    pub broadcaster: Broadcaster,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new(log: Arc<dyn MessageLog>) -> Self {
        Self {
            registry: NicknameRegistry::new(),
            broadcaster: Broadcaster::new(log),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
