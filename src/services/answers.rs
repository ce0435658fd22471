//! Answer submission and retrieval for the open round.

use indexmap::IndexMap;

use crate::error::ServiceError;
use crate::model::{AnswerRecord, ParticipantId, RoomCode, RoundDoc, now_millis};
use crate::session::SessionContext;
use crate::store::{self, RealtimeStore, path};

/// Record this participant's answer to the open round. Submitting again
/// overwrites; what counts is the record present when the round closes.
///
/// Fails with [`ServiceError::RoundClosed`] when no round is accepting
/// answers.
pub async fn submit_answer(
    ctx: &SessionContext,
    selected: impl Into<String>,
) -> Result<(), ServiceError> {
    let store = ctx.store();
    let round: Option<RoundDoc> =
        store::read_doc(store, path::current_round(ctx.room())).await?;
    let round = round
        .filter(|doc| doc.round_active)
        .ok_or(ServiceError::RoundClosed)?;

    let record = AnswerRecord {
        selected: selected.into(),
        remaining_time: round.remaining_time,
        timestamp: now_millis(),
    };
    store::put_doc(
        store,
        path::answer_entry(ctx.room(), round.round_id, ctx.participant()),
        &record,
    )
    .await?;
    Ok(())
}

/// All recorded answers for one round, keyed by participant in
/// first-submission order.
pub async fn read_round_answers(
    store: &dyn RealtimeStore,
    room: &RoomCode,
    round_id: u64,
) -> Result<IndexMap<ParticipantId, AnswerRecord>, ServiceError> {
    let answers = store::read_doc(store, path::answers(room, round_id)).await?;
    Ok(answers.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::RoomCode;
    use crate::session::ClientSession;
    use crate::store::MemoryStore;

    fn open_round(round_id: u64, active: bool) -> RoundDoc {
        RoundDoc {
            question: "Largest ocean?".to_string(),
            options: vec!["Pacific".to_string(), "Atlantic".to_string()],
            answer: "Pacific".to_string(),
            category: "Geography".to_string(),
            remaining_time: 12,
            total_time: 20,
            round_active: active,
            round_id,
            round_number: 1,
        }
    }

    fn room_ctx(store: &MemoryStore, name: &str) -> SessionContext {
        let session = ClientSession::new(Arc::new(store.client()), name);
        SessionContext::new(session, RoomCode::parse("ABCDEF").unwrap())
    }

    #[tokio::test]
    async fn submitting_without_an_open_round_fails() {
        let store = MemoryStore::new();
        let ctx = room_ctx(&store, "Ana");

        assert!(matches!(
            submit_answer(&ctx, "Pacific").await,
            Err(ServiceError::RoundClosed)
        ));

        store::put_doc(
            ctx.store(),
            path::current_round(ctx.room()),
            &open_round(3, false),
        )
        .await
        .unwrap();
        assert!(matches!(
            submit_answer(&ctx, "Pacific").await,
            Err(ServiceError::RoundClosed)
        ));
    }

    #[tokio::test]
    async fn resubmission_overwrites_the_previous_answer() {
        let store = MemoryStore::new();
        let ctx = room_ctx(&store, "Ana");
        store::put_doc(
            ctx.store(),
            path::current_round(ctx.room()),
            &open_round(7, true),
        )
        .await
        .unwrap();

        submit_answer(&ctx, "Atlantic").await.unwrap();
        submit_answer(&ctx, "Pacific").await.unwrap();

        let answers = read_round_answers(ctx.store(), ctx.room(), 7).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[&ctx.participant()].selected, "Pacific");
        assert_eq!(answers[&ctx.participant()].remaining_time, 12);
    }
}
