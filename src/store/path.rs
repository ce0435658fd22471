//! Locations of the shared documents inside the realtime tree.

use std::fmt;

use crate::model::{ParticipantId, RoomCode};

/// Normalised slash-separated location in the shared tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorePath(String);

impl StorePath {
    /// Build a path from a slash-separated string, dropping empty segments.
    pub fn new(path: impl AsRef<str>) -> Self {
        let joined = path
            .as_ref()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Append one segment.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self::new(format!("{}/{}", self.0, segment.as_ref()))
    }

    /// Segments from root to leaf.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// The path in its slash-separated form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `self` is `other` itself or one of its ancestors.
    pub fn contains(&self, other: &StorePath) -> bool {
        if self.0.is_empty() {
            return true;
        }
        other.0.starts_with(&self.0)
            && (other.0.len() == self.0.len() || other.0.as_bytes()[self.0.len()] == b'/')
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Root of one room's subtree.
pub fn room(code: &RoomCode) -> StorePath {
    StorePath::new("rooms").child(code.as_str())
}

/// Leaderboard collection for a room.
pub fn leaderboard(code: &RoomCode) -> StorePath {
    room(code).child("leaderboard")
}

/// One participant's leaderboard entry.
pub fn player(code: &RoomCode, participant: ParticipantId) -> StorePath {
    leaderboard(code).child(participant.to_string())
}

/// Presence collection: one ephemeral marker per live member.
pub fn presence(code: &RoomCode) -> StorePath {
    room(code).child("presence")
}

/// One participant's presence marker.
pub fn presence_entry(code: &RoomCode, participant: ParticipantId) -> StorePath {
    presence(code).child(participant.to_string())
}

/// Disconnect beacon prompting survivors to re-check presence.
pub fn cleanup(code: &RoomCode) -> StorePath {
    room(code).child("cleanup")
}

/// The room's single round document.
pub fn current_round(code: &RoomCode) -> StorePath {
    room(code).child("currentRound")
}

/// Count of rounds started so far.
pub fn round_index(code: &RoomCode) -> StorePath {
    room(code).child("currentRoundIndex")
}

/// Answer collection for one round.
pub fn answers(code: &RoomCode, round_id: u64) -> StorePath {
    room(code).child("answers").child(round_id.to_string())
}

/// One participant's answer for one round.
pub fn answer_entry(code: &RoomCode, round_id: u64, participant: ParticipantId) -> StorePath {
    answers(code, round_id).child(participant.to_string())
}

/// Snapshot of the last evaluated round.
pub fn last_results(code: &RoomCode) -> StorePath {
    room(code).child("lastResults")
}

/// Boolean gate flipped when the question budget is exhausted.
pub fn game_over(code: &RoomCode) -> StorePath {
    room(code).child("gameOver")
}

/// Winner snapshot.
pub fn winner(code: &RoomCode) -> StorePath {
    room(code).child("winner")
}

/// Shared countdown anchor.
pub fn countdown(code: &RoomCode) -> StorePath {
    room(code).child("countdown")
}

/// Chat collection.
pub fn chat(code: &RoomCode) -> StorePath {
    room(code).child("chat")
}

/// One chat message.
pub fn chat_message(code: &RoomCode, key: &str) -> StorePath {
    chat(code).child(key)
}

/// Discovery listing of every open room.
pub fn public_rooms() -> StorePath {
    StorePath::new("publicRooms")
}

/// Discovery summary for one room.
pub fn public_room(code: &RoomCode) -> StorePath {
    public_rooms().child(code.as_str())
}

/// Mirrored live player count inside the discovery summary.
pub fn public_room_players(code: &RoomCode) -> StorePath {
    public_room(code).child("players")
}
