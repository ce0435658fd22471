//! Documents and identifiers shared through the realtime tree.
//!
//! Everything here serialises with the field names the store layout in
//! [`crate::store::path`] expects, so a document written by one client can be
//! decoded by any other.

use std::fmt;

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Milliseconds since the Unix epoch, the timestamp unit used across the tree.
pub fn now_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

/// Render a millisecond timestamp as RFC 3339 for logs and listings.
pub fn format_millis(millis: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|moment| moment.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".to_string())
}

/// Opaque, session-stable participant identity.
///
/// Minted once per connected session; there are no accounts behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Mint a fresh identity for a new session.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short prefix used to build default display names.
    pub fn short(&self) -> String {
        let mut compact = self.0.simple().to_string();
        compact.truncate(5);
        compact
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const ROOM_CODE_LENGTH: usize = 6;

/// Short room identifier participants type to join: six uppercase ASCII
/// letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

/// Error returned when an entered room code is not six ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("room codes are six ASCII letters (got `{0}`)")]
pub struct InvalidRoomCode(String);

impl RoomCode {
    /// Draw a random code from the 26^6 space.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LENGTH)
            .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
            .collect();
        Self(code)
    }

    /// Parse user input, trimming whitespace and upper-casing letters.
    pub fn parse(input: &str) -> Result<Self, InvalidRoomCode> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() == ROOM_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(InvalidRoomCode(input.trim().to_string()))
        }
    }

    /// The code as a path segment.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Question difficulty; [`crate::config::time_budget_secs`] maps it to the
/// length of the answer window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Difficulty {
    /// The longest answer window.
    #[default]
    Easy,
    /// Middle answer window.
    Medium,
    /// The shortest answer window.
    Hard,
}

impl Difficulty {
    /// Wire name understood by question sources and stored settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl From<String> for Difficulty {
    /// Unrecognised names fall back to [`Difficulty::Easy`] and its budget.
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Easy,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-chosen knobs for one game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Rounds to play before the game ends.
    pub question_count: u32,
    /// Difficulty forwarded to the question source; also sets the answer
    /// window.
    pub difficulty: Difficulty,
}

/// Root room document holding host identity and game settings.
///
/// The child collections (leaderboard, presence, chat, ...) live under the
/// same tree node; decoding ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDoc {
    /// Identity of the single participant allowed to drive rounds.
    pub host: ParticipantId,
    /// Creation time in unix millis.
    pub created_at: u64,
    /// Display name of the trivia category.
    pub category: String,
    /// Host-chosen game settings.
    pub settings: RoomSettings,
}

/// Leaderboard entry for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    /// Display name.
    pub name: String,
    /// Cumulative score; never decreases during a game.
    pub score: u32,
}

/// Discovery projection of a room, derived from the room document and its
/// presence set and never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRoomSummary {
    /// Host display name.
    pub host_name: String,
    /// Live participant count mirrored from presence.
    pub players: u32,
    /// Creation time in unix millis.
    pub created_at: u64,
}

/// The single round document of a room, overwritten in place each round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDoc {
    /// Question text, stored verbatim as the source supplied it.
    pub question: String,
    /// Answer options in their fixed display order, shuffled once at fetch.
    pub options: Vec<String>,
    /// The correct option.
    pub answer: String,
    /// Category label for display.
    pub category: String,
    /// Seconds left on the shared clock, host-decremented once per second.
    pub remaining_time: u32,
    /// Full budget the round started with.
    pub total_time: u32,
    /// Whether answers are still being accepted.
    pub round_active: bool,
    /// Unique, monotonically increasing round identifier.
    pub round_id: u64,
    /// 1-based display number of this round.
    pub round_number: u32,
}

/// One participant's submitted answer, keyed by round and participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    /// The chosen option; later submissions overwrite earlier ones.
    pub selected: String,
    /// Shared-clock seconds remaining when the answer was recorded.
    pub remaining_time: u32,
    /// Submission time in unix millis.
    pub timestamp: u64,
}

/// Snapshot of the most recently evaluated round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultDoc {
    /// Round this snapshot belongs to.
    pub round_id: u64,
    /// Evaluation time in unix millis.
    pub timestamp: u64,
    /// The correct option, revealed to every client.
    pub correct_answer: String,
    /// Outcome for everyone on the leaderboard, answering or not.
    pub players: IndexMap<ParticipantId, PlayerOutcome>,
}

/// Outcome of one round for one participant.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOutcome {
    /// The option they submitted; absent when they never answered.
    pub selected: Option<String>,
    /// Whether the submission matched the correct option.
    pub correct: bool,
    /// Points added to their score this round.
    pub awarded: u32,
    /// Portion of the award earned by answering early.
    pub time_bonus: u32,
}

/// Winner snapshot written once when the game ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerDoc {
    /// Winning participant.
    pub id: ParticipantId,
    /// Their display name.
    pub name: String,
    /// Their final score.
    pub score: u32,
}

/// Shared pair from which every client derives the same countdown display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownAnchor {
    /// Absolute start time in unix millis.
    pub start_at: u64,
    /// Countdown length in seconds.
    pub duration: u32,
}

/// Beacon the store writes on a participant's behalf when their connection
/// drops, prompting surviving clients to re-check presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupBeacon {
    /// When the disconnect action was registered, unix millis.
    pub timestamp: u64,
    /// The participant whose disconnect produced the beacon.
    pub triggered_by: ParticipantId,
}

/// One chat line, appended under a store-generated key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageDoc {
    /// Sender display name.
    pub user: String,
    /// Message body, stored verbatim.
    pub text: String,
    /// Send time in unix millis, the display ordering key.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_uppercase_letters() {
        for _ in 0..64 {
            let code = RoomCode::generate();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_uppercase()));
        }
    }

    #[test]
    fn parse_trims_and_upcases() {
        let code = RoomCode::parse("  abcdef\n").unwrap();
        assert_eq!(code.as_str(), "ABCDEF");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(RoomCode::parse("ABC").is_err());
        assert!(RoomCode::parse("ABCDEFG").is_err());
        assert!(RoomCode::parse("ABC12F").is_err());
        assert!(RoomCode::parse("").is_err());
    }

    #[test]
    fn unknown_difficulty_falls_back_to_easy() {
        assert_eq!(Difficulty::from("HARD".to_string()), Difficulty::Hard);
        assert_eq!(Difficulty::from(" medium ".to_string()), Difficulty::Medium);
        assert_eq!(Difficulty::from("impossible".to_string()), Difficulty::Easy);
        assert_eq!(Difficulty::from(String::new()), Difficulty::Easy);
    }

    #[test]
    fn difficulty_round_trips_through_json() {
        let json = serde_json::to_string(&Difficulty::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let back: Difficulty = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Difficulty::Medium);
    }

    #[test]
    fn short_id_is_five_characters() {
        assert_eq!(ParticipantId::mint().short().len(), 5);
    }

    #[test]
    fn round_doc_uses_camel_case_keys() {
        let round = RoundDoc {
            question: "q".into(),
            options: vec!["a".into(), "b".into()],
            answer: "a".into(),
            category: "General Knowledge".into(),
            remaining_time: 20,
            total_time: 20,
            round_active: true,
            round_id: 7,
            round_number: 1,
        };
        let value = serde_json::to_value(&round).unwrap();
        assert!(value.get("remainingTime").is_some());
        assert!(value.get("roundActive").is_some());
        assert!(value.get("roundId").is_some());
        assert!(value.get("remaining_time").is_none());
    }

    #[test]
    fn absent_selection_is_omitted_from_outcomes() {
        let outcome = PlayerOutcome {
            selected: None,
            correct: false,
            awarded: 0,
            time_bonus: 0,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert!(value.get("selected").is_none());
        assert!(value.get("timeBonus").is_some());
    }
}
