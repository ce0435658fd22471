//! Participant identity and the room-scoped context services operate on.

use std::fmt;
use std::sync::Arc;

use crate::model::{ParticipantId, RoomCode};
use crate::store::RealtimeStore;

/// One participant's store connection, before joining any room.
#[derive(Clone)]
pub struct ClientSession {
    store: Arc<dyn RealtimeStore>,
    participant: ParticipantId,
    name: String,
}

impl ClientSession {
    /// Open a session under a display name. A blank name gets a generated
    /// `Player-xxxxx` one.
    pub fn new(store: Arc<dyn RealtimeStore>, name: impl Into<String>) -> Self {
        let participant = ParticipantId::mint();
        let name = name.into();
        let name = if name.trim().is_empty() {
            format!("Player-{}", participant.short())
        } else {
            name
        };
        Self {
            store,
            participant,
            name,
        }
    }

    /// The store this session talks to.
    pub fn store(&self) -> &dyn RealtimeStore {
        self.store.as_ref()
    }

    /// Stable identifier for this participant.
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Display name shown to other players.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("participant", &self.participant)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A session bound to one room. Everything room-scoped takes this.
#[derive(Clone, Debug)]
pub struct SessionContext {
    session: ClientSession,
    room: RoomCode,
}

impl SessionContext {
    pub(crate) fn new(session: ClientSession, room: RoomCode) -> Self {
        Self { session, room }
    }

    /// The store this session talks to.
    pub fn store(&self) -> &dyn RealtimeStore {
        self.session.store()
    }

    /// Stable identifier for this participant.
    pub fn participant(&self) -> ParticipantId {
        self.session.participant()
    }

    /// Display name shown to other players.
    pub fn name(&self) -> &str {
        self.session.name()
    }

    /// Code of the room this context is bound to.
    pub fn room(&self) -> &RoomCode {
        &self.room
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn blank_names_get_generated_ones() {
        let store = MemoryStore::new();
        let session = ClientSession::new(Arc::new(store.client()), "  ");
        assert!(session.name().starts_with("Player-"));
        assert_eq!(session.name().len(), "Player-".len() + 5);
    }

    #[test]
    fn provided_names_are_kept() {
        let store = MemoryStore::new();
        let session = ClientSession::new(Arc::new(store.client()), "Nova");
        assert_eq!(session.name(), "Nova");
    }
}
