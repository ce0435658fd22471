//! Room chat: store-generated keys give messages a stable order.

use serde_json::Value;

use crate::error::ServiceError;
use crate::model::{ChatMessageDoc, now_millis};
use crate::session::SessionContext;
use crate::store::{self, path};

/// Post a chat message under this participant's display name. Blank
/// messages are dropped; anything else is stored verbatim.
pub async fn post_message(
    ctx: &SessionContext,
    text: impl Into<String>,
) -> Result<(), ServiceError> {
    let text = text.into();
    if text.trim().is_empty() {
        return Ok(());
    }
    let store = ctx.store();
    let key = store.generate_key(&path::chat(ctx.room()));
    let message = ChatMessageDoc {
        user: ctx.name().to_string(),
        text,
        timestamp: now_millis(),
    };
    store::put_doc(store, path::chat_message(ctx.room(), &key), &message).await?;
    Ok(())
}

/// Read the room's chat feed in display order.
pub async fn read_feed(ctx: &SessionContext) -> Result<Vec<ChatMessageDoc>, ServiceError> {
    let snapshot = ctx.store().read(path::chat(ctx.room())).await?;
    Ok(sorted_feed(snapshot.as_ref()))
}

/// Order a chat snapshot by timestamp, message key breaking ties.
/// Entries that fail to decode are skipped.
pub fn sorted_feed(snapshot: Option<&Value>) -> Vec<ChatMessageDoc> {
    let Some(entries) = snapshot.and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut feed: Vec<(&String, ChatMessageDoc)> = entries
        .iter()
        .filter_map(|(key, value)| {
            let message: ChatMessageDoc = serde_json::from_value(value.clone()).ok()?;
            Some((key, message))
        })
        .collect();
    feed.sort_by(|a, b| (a.1.timestamp, a.0).cmp(&(b.1.timestamp, b.0)));
    feed.into_iter().map(|(_, message)| message).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::model::RoomCode;
    use crate::session::ClientSession;
    use crate::store::MemoryStore;

    #[test]
    fn feed_orders_by_timestamp_then_key() {
        let snapshot = json!({
            "k2": { "user": "Ben", "text": "second", "timestamp": 10 },
            "k1": { "user": "Ana", "text": "first", "timestamp": 10 },
            "k3": { "user": "Ana", "text": "third", "timestamp": 4 },
            "bad": { "user": "Eve" },
        });

        let feed = sorted_feed(Some(&snapshot));
        let texts: Vec<&str> = feed.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["third", "first", "second"]);
    }

    #[test]
    fn empty_snapshots_give_an_empty_feed() {
        assert!(sorted_feed(None).is_empty());
        assert!(sorted_feed(Some(&json!(42))).is_empty());
    }

    #[tokio::test]
    async fn blank_messages_are_dropped() {
        let store = MemoryStore::new();
        let session = ClientSession::new(Arc::new(store.client()), "Ana");
        let ctx = SessionContext::new(session, RoomCode::parse("ABCDEF").unwrap());

        post_message(&ctx, "   ").await.unwrap();
        post_message(&ctx, "hello").await.unwrap();

        let feed = read_feed(&ctx).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].text, "hello");
        assert_eq!(feed[0].user, "Ana");
    }
}
