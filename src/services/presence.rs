//! Presence markers and the reconciliation that cleans up abandoned rooms.
//!
//! Every participant marks itself present and registers two disconnect
//! actions with the store: delete its own marker, and raise a cleanup beacon.
//! Every participant also watches presence and the beacon, so whichever
//! client is still alive reconciles the room. Reconciliation is idempotent;
//! concurrent runs from several clients converge on the same state.

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::model::{CleanupBeacon, RoomCode, now_millis};
use crate::session::SessionContext;
use crate::store::{self, DisconnectAction, RealtimeStore, path};

/// Mark this participant present and arm its disconnect actions.
pub async fn mark_present(ctx: &SessionContext) -> Result<(), ServiceError> {
    let store = ctx.store();
    let entry = path::presence_entry(ctx.room(), ctx.participant());
    store.put(entry.clone(), Value::Bool(true)).await?;
    store.on_disconnect(entry, DisconnectAction::Delete).await?;

    let beacon_path = path::cleanup(ctx.room());
    let beacon = CleanupBeacon {
        timestamp: now_millis(),
        triggered_by: ctx.participant(),
    };
    let value = store::doc_value(&beacon_path, &beacon)?;
    store
        .on_disconnect(beacon_path, DisconnectAction::Set(value))
        .await?;
    Ok(())
}

/// Watch presence and cleanup beacons, reconciling the room on every change.
///
/// The task ends once the room is gone or this client's connection drops.
pub fn watch_room(ctx: &SessionContext) -> JoinHandle<()> {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let store = ctx.store();
        let mut presence = match store.subscribe(path::presence(ctx.room())).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(room = %ctx.room(), error = %err, "presence watch failed to start");
                return;
            }
        };
        let mut cleanup = match store.subscribe(path::cleanup(ctx.room())).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(room = %ctx.room(), error = %err, "cleanup watch failed to start");
                return;
            }
        };

        loop {
            let relevant = tokio::select! {
                snapshot = presence.recv() => match snapshot {
                    Some(_) => true,
                    None => break,
                },
                beacon = cleanup.recv() => match beacon {
                    // only a raised beacon matters, not its later removal
                    Some(value) => value.is_some(),
                    None => break,
                },
            };
            if !relevant {
                continue;
            }
            match reconcile_room(store, ctx.room()).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!(room = %ctx.room(), error = %err, "room reconcile failed");
                }
            }
        }
    })
}

/// Mirror the live player count into the public listing, tearing the room
/// down when nobody is left. Resolves to whether the room still exists.
pub async fn reconcile_room(
    store: &dyn RealtimeStore,
    room: &RoomCode,
) -> Result<bool, ServiceError> {
    let count = presence_count(store, room).await?;
    if count == 0 {
        let existed = store.read(path::room(room)).await?.is_some();
        store.delete(path::room(room)).await?;
        store.delete(path::public_room(room)).await?;
        if existed {
            info!(room = %room, "room abandoned; removed");
        }
        return Ok(false);
    }

    let mut fields = Map::new();
    fields.insert("players".to_string(), Value::from(count));
    store.update(path::public_room(room), fields).await?;
    Ok(true)
}

/// Number of participants currently marked present in a room.
pub async fn presence_count(
    store: &dyn RealtimeStore,
    room: &RoomCode,
) -> Result<u64, ServiceError> {
    let snapshot = store.read(path::presence(room)).await?;
    Ok(snapshot
        .as_ref()
        .and_then(Value::as_object)
        .map(|entries| entries.len() as u64)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::session::ClientSession;
    use crate::store::MemoryStore;

    fn room_ctx(store: &MemoryStore, code: &str, name: &str) -> SessionContext {
        let session = ClientSession::new(Arc::new(store.client()), name);
        SessionContext::new(session, RoomCode::parse(code).unwrap())
    }

    #[tokio::test]
    async fn mark_present_writes_the_marker() {
        let store = MemoryStore::new();
        let ctx = room_ctx(&store, "ABCDEF", "Ana");

        mark_present(&ctx).await.unwrap();

        let entry = ctx
            .store()
            .read(path::presence_entry(ctx.room(), ctx.participant()))
            .await
            .unwrap();
        assert_eq!(entry, Some(json!(true)));
    }

    #[tokio::test]
    async fn reconcile_mirrors_the_player_count() {
        let store = MemoryStore::new();
        let first = room_ctx(&store, "ABCDEF", "Ana");
        let second = room_ctx(&store, "ABCDEF", "Ben");
        let client = store.client();

        client
            .put(path::public_room(first.room()), json!({ "players": 1 }))
            .await
            .unwrap();
        mark_present(&first).await.unwrap();
        mark_present(&second).await.unwrap();

        assert!(reconcile_room(&client, first.room()).await.unwrap());
        let listing = client
            .read(path::public_room(first.room()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listing["players"], json!(2));
    }

    #[tokio::test]
    async fn reconcile_removes_an_empty_room() {
        let store = MemoryStore::new();
        let client = store.client();
        let room = RoomCode::parse("QWERTY").unwrap();

        client
            .put(path::room(&room).child("gameOver"), json!(false))
            .await
            .unwrap();
        client
            .put(path::public_room(&room), json!({ "players": 1 }))
            .await
            .unwrap();

        assert!(!reconcile_room(&client, &room).await.unwrap());
        assert_eq!(client.read(path::room(&room)).await.unwrap(), None);
        assert_eq!(client.read(path::public_room(&room)).await.unwrap(), None);

        // reconciling an already-removed room stays quiet
        assert!(!reconcile_room(&client, &room).await.unwrap());
    }
}
