//! Room lifecycle: creating, joining, leaving, and the public listing.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};
use validator::Validate;

use crate::config::{self, DEFAULT_QUESTION_COUNT, PREFETCH_BATCH};
use crate::error::ServiceError;
use crate::model::{
    Difficulty, PlayerEntry, PublicRoomSummary, RoomCode, RoomDoc, RoomSettings, now_millis,
};
use crate::questions::{QuestionBank, QuestionSource};
use crate::services::presence;
use crate::session::{ClientSession, SessionContext};
use crate::state::{HostAuthority, driver};
use crate::store::{self, RealtimeStore, path};

const CODE_ATTEMPTS: u32 = 16;

/// Settings a host submits when opening a room.
#[derive(Debug, Clone, Validate)]
pub struct CreateRoomRequest {
    /// Catalog identifier of the trivia category.
    pub category_id: u32,
    /// Difficulty, which also fixes the per-round time budget.
    pub difficulty: Difficulty,
    /// Rounds the game runs before it is over.
    #[validate(range(
        min = 3,
        max = 50,
        message = "question count must be between 3 and 50"
    ))]
    pub question_count: u32,
}

impl Default for CreateRoomRequest {
    fn default() -> Self {
        Self {
            category_id: 9,
            difficulty: Difficulty::Easy,
            question_count: DEFAULT_QUESTION_COUNT,
        }
    }
}

/// Open a room: write its documents, seat the host, start its watchers, and
/// hand back the host's driver handle alongside the room context.
pub async fn create_room(
    session: &ClientSession,
    request: CreateRoomRequest,
    questions: Arc<dyn QuestionSource>,
) -> Result<(SessionContext, HostAuthority), ServiceError> {
    request.validate()?;
    let category = config::category_name(request.category_id).ok_or_else(|| {
        ServiceError::InvalidSettings(format!("unknown category id {}", request.category_id))
    })?;

    let store = session.store();
    let code = allocate_code(store).await?;

    let room = RoomDoc {
        host: session.participant(),
        created_at: now_millis(),
        category: category.to_string(),
        settings: RoomSettings {
            question_count: request.question_count,
            difficulty: request.difficulty,
        },
    };
    store::put_doc(store, path::room(&code), &room).await?;
    store::put_doc(
        store,
        path::player(&code, session.participant()),
        &PlayerEntry {
            name: session.name().to_string(),
            score: 0,
        },
    )
    .await?;
    store::put_doc(
        store,
        path::public_room(&code),
        &PublicRoomSummary {
            host_name: session.name().to_string(),
            players: 1,
            created_at: room.created_at,
        },
    )
    .await?;

    let ctx = SessionContext::new(session.clone(), code.clone());
    presence::mark_present(&ctx).await?;
    presence::watch_room(&ctx);

    let bank = QuestionBank::new(
        questions,
        request.category_id,
        request.difficulty,
        PREFETCH_BATCH,
    );
    if let Err(err) = bank.prefetch().await {
        warn!(room = %code, error = %err, "question prefetch failed; will retry at round start");
    }
    let authority = driver::spawn(ctx.clone(), bank);

    info!(room = %code, host = %session.name(), "room created");
    Ok((ctx, authority))
}

/// Join an existing room by code.
pub async fn join_room(
    session: &ClientSession,
    code: RoomCode,
) -> Result<SessionContext, ServiceError> {
    let store = session.store();
    let room: Option<RoomDoc> = store::read_doc(store, path::room(&code)).await?;
    if room.is_none() {
        return Err(ServiceError::RoomNotFound(code));
    }

    store::put_doc(
        store,
        path::player(&code, session.participant()),
        &PlayerEntry {
            name: session.name().to_string(),
            score: 0,
        },
    )
    .await?;
    store
        .transact(
            path::public_room_players(&code),
            Box::new(|current| {
                let count = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
                Some(Value::from(count + 1))
            }),
        )
        .await?;

    let ctx = SessionContext::new(session.clone(), code);
    presence::mark_present(&ctx).await?;
    presence::watch_room(&ctx);

    info!(room = %ctx.room(), player = %session.name(), "joined room");
    Ok(ctx)
}

/// Leave a room. A departing host tears the room down for everyone; anyone
/// else just drops their presence marker and lets reconciliation mirror the
/// new count.
pub async fn leave_room(ctx: &SessionContext) -> Result<(), ServiceError> {
    let store = ctx.store();
    store
        .delete(path::presence_entry(ctx.room(), ctx.participant()))
        .await?;

    let room: Option<RoomDoc> = store::read_doc(store, path::room(ctx.room())).await?;
    if room.is_some_and(|doc| doc.host == ctx.participant()) {
        info!(room = %ctx.room(), "host left; tearing the room down");
        store.delete(path::room(ctx.room())).await?;
        store.delete(path::public_room(ctx.room())).await?;
    }
    Ok(())
}

/// Live view of the public room listing, in creation order.
pub fn watch_public_rooms(
    store: Arc<dyn RealtimeStore>,
) -> watch::Receiver<Vec<(RoomCode, PublicRoomSummary)>> {
    let (sender, receiver) = watch::channel(Vec::new());
    tokio::spawn(async move {
        let mut subscription = match store.subscribe(path::public_rooms()).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(error = %err, "public listing watch failed to start");
                return;
            }
        };
        while let Some(snapshot) = subscription.recv().await {
            if sender.send(decode_listing(snapshot.as_ref())).is_err() {
                break;
            }
        }
    });
    receiver
}

fn decode_listing(snapshot: Option<&Value>) -> Vec<(RoomCode, PublicRoomSummary)> {
    let Some(entries) = snapshot.and_then(Value::as_object) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|(code, value)| {
            let code = RoomCode::parse(code).ok()?;
            let summary = serde_json::from_value(value.clone()).ok()?;
            Some((code, summary))
        })
        .collect()
}

async fn allocate_code(store: &dyn RealtimeStore) -> Result<RoomCode, ServiceError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = RoomCode::generate();
        if store.read(path::room(&code)).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::CodeAllocation)
}
