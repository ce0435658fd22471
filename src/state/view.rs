//! What a participant sees: the room node decoded into one value.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::ServiceError;
use crate::model::{
    ChatMessageDoc, ParticipantId, PlayerEntry, RoomDoc, RoundDoc, RoundResultDoc, WinnerDoc,
};
use crate::services::chat;
use crate::session::SessionContext;
use crate::store::path;

/// Decoded snapshot of everything under a room's node.
///
/// Decoding is lenient: fields that are absent or fail to decode become
/// their empty defaults, so one malformed child never blanks the whole view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomView {
    /// The room document, `None` once the room is gone.
    pub room: Option<RoomDoc>,
    /// Whether the viewing participant is the room's host.
    pub is_host: bool,
    /// Scores by participant, in join order.
    pub leaderboard: IndexMap<ParticipantId, PlayerEntry>,
    /// The current round document, if one has been opened.
    pub round: Option<RoundDoc>,
    /// Results of the most recently evaluated round.
    pub results: Option<RoundResultDoc>,
    /// How many rounds have been opened this game.
    pub round_index: u32,
    /// Whether the game has ended.
    pub game_over: bool,
    /// The recorded winner, present once the game is over.
    pub winner: Option<WinnerDoc>,
    /// Chat feed in display order.
    pub chat: Vec<ChatMessageDoc>,
}

impl RoomView {
    /// Decode a raw room snapshot as seen by `viewer`.
    pub fn decode(viewer: ParticipantId, snapshot: Option<&Value>) -> Self {
        let Some(root) = snapshot.and_then(Value::as_object) else {
            return Self::default();
        };
        let room: Option<RoomDoc> = serde_json::from_value(Value::Object(root.clone())).ok();
        Self {
            is_host: room.as_ref().is_some_and(|doc| doc.host == viewer),
            room,
            leaderboard: decode_field(root, "leaderboard").unwrap_or_default(),
            round: decode_field(root, "currentRound"),
            results: decode_field(root, "lastResults"),
            round_index: root
                .get("currentRoundIndex")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            game_over: root
                .get("gameOver")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            winner: decode_field(root, "winner"),
            chat: chat::sorted_feed(root.get("chat")),
        }
    }
}

fn decode_field<T: DeserializeOwned>(root: &Map<String, Value>, key: &str) -> Option<T> {
    root.get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// Live [`RoomView`] fed from the store's room subscription.
#[derive(Debug)]
pub struct RoomWatcher {
    receiver: watch::Receiver<RoomView>,
}

impl RoomWatcher {
    /// Subscribe to the room and keep a decoded view current.
    pub async fn spawn(ctx: &SessionContext) -> Result<Self, ServiceError> {
        let mut subscription = ctx.store().subscribe(path::room(ctx.room())).await?;
        let viewer = ctx.participant();
        let (sender, receiver) = watch::channel(RoomView::default());
        tokio::spawn(async move {
            while let Some(snapshot) = subscription.recv().await {
                let view = RoomView::decode(viewer, snapshot.as_ref());
                if sender.send(view).is_err() {
                    break;
                }
            }
        });
        Ok(Self { receiver })
    }

    /// The current view.
    pub fn view(&self) -> RoomView {
        self.receiver.borrow().clone()
    }

    /// Wait for the view to change.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.receiver.changed().await
    }

    /// Wait for a view that satisfies `accept` (checking the current one
    /// first) and return it.
    pub async fn wait_for(
        &mut self,
        accept: impl FnMut(&RoomView) -> bool,
    ) -> Result<RoomView, watch::error::RecvError> {
        let view = self.receiver.wait_for(accept).await?;
        Ok(view.clone())
    }

    /// Raw handle for select loops.
    pub fn receiver(&self) -> watch::Receiver<RoomView> {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::model::{Difficulty, RoomCode};
    use crate::session::ClientSession;
    use crate::store::{self, MemoryStore};

    #[test]
    fn missing_snapshot_decodes_to_the_default_view() {
        let view = RoomView::decode(ParticipantId::mint(), None);
        assert_eq!(view, RoomView::default());
        assert!(!view.is_host);
        assert!(view.leaderboard.is_empty());
    }

    #[test]
    fn snapshot_decodes_across_children() {
        let host = ParticipantId::mint();
        let mut snapshot = json!({
            "host": host,
            "createdAt": 1_700_000_000_000_u64,
            "category": "Geography",
            "settings": { "questionCount": 3, "difficulty": "hard" },
            "currentRoundIndex": 2,
            "gameOver": false,
            "chat": {
                "k1": { "user": "Ana", "text": "hi", "timestamp": 5 },
            },
        });
        snapshot["leaderboard"][host.to_string()] = json!({ "name": "Ana", "score": 17 });

        let view = RoomView::decode(host, Some(&snapshot));
        assert!(view.is_host);
        let room = view.room.unwrap();
        assert_eq!(room.settings.difficulty, Difficulty::Hard);
        assert_eq!(room.settings.question_count, 3);
        assert_eq!(view.leaderboard[&host].score, 17);
        assert_eq!(view.round_index, 2);
        assert!(view.round.is_none());
        assert_eq!(view.chat.len(), 1);

        let stranger = RoomView::decode(ParticipantId::mint(), Some(&snapshot));
        assert!(!stranger.is_host);
    }

    #[tokio::test]
    async fn watcher_follows_room_writes() {
        let backend = MemoryStore::new();
        let session = ClientSession::new(Arc::new(backend.client()), "Ana");
        let ctx = SessionContext::new(session, RoomCode::parse("ABCDEF").unwrap());

        let mut watcher = RoomWatcher::spawn(&ctx).await.unwrap();
        assert!(watcher.view().room.is_none());

        let doc = crate::model::RoomDoc {
            host: ctx.participant(),
            created_at: 1,
            category: "Geography".to_string(),
            settings: crate::model::RoomSettings {
                question_count: 3,
                difficulty: Difficulty::Easy,
            },
        };
        store::put_doc(ctx.store(), path::room(ctx.room()), &doc)
            .await
            .unwrap();

        let view = tokio::time::timeout(
            Duration::from_secs(5),
            watcher.wait_for(|view| view.room.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(view.is_host);
        assert_eq!(view.room.unwrap().category, "Geography");
    }
}
