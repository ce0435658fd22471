//! Answer checking, point awards, and end-of-round evaluation.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::ServiceError;
use crate::model::{
    ParticipantId, PlayerEntry, PlayerOutcome, RoundDoc, RoundResultDoc, WinnerDoc, now_millis,
};
use crate::services::answers;
use crate::session::SessionContext;
use crate::store::{self, path};

/// Points for a correct answer before the time bonus.
pub const BASE_AWARD: u32 = 10;

/// Whether a submitted option matches the correct one. Case and surrounding
/// whitespace do not count against the player.
pub fn answers_match(submitted: &str, correct: &str) -> bool {
    normalize(submitted) == normalize(correct)
}

fn normalize(option: &str) -> String {
    option.trim().to_lowercase()
}

/// Points for a correct answer submitted with `remaining` seconds left,
/// as `(award, time_bonus)`.
pub fn award_for(remaining: u32) -> (u32, u32) {
    let bonus = remaining / 2;
    (BASE_AWARD + bonus, bonus)
}

/// The leaderboard entry with the strictly greatest score, scanned in join
/// order so ties keep the earliest joiner. `None` on an empty board.
pub fn pick_winner(board: &IndexMap<ParticipantId, PlayerEntry>) -> Option<WinnerDoc> {
    let mut winner: Option<(&ParticipantId, &PlayerEntry)> = None;
    for (id, entry) in board {
        if winner.is_none_or(|(_, best)| entry.score > best.score) {
            winner = Some((id, entry));
        }
    }
    winner.map(|(id, entry)| WinnerDoc {
        id: *id,
        name: entry.name.clone(),
        score: entry.score,
    })
}

/// Close the round and settle it: award scores and publish the result
/// snapshot. Host-only, once per round.
///
/// The round is marked inactive before any answer is read, so a submission
/// racing the deadline either lands in time or is rejected; it can never be
/// half-counted.
pub async fn evaluate_round(
    ctx: &SessionContext,
    round: &RoundDoc,
) -> Result<RoundResultDoc, ServiceError> {
    let store = ctx.store();
    let room = ctx.room();

    let mut fields = Map::new();
    fields.insert("roundActive".to_string(), Value::Bool(false));
    fields.insert("remainingTime".to_string(), Value::from(0));
    store.update(path::current_round(room), fields).await?;

    let records = answers::read_round_answers(store, room, round.round_id).await?;
    let board: IndexMap<ParticipantId, PlayerEntry> =
        store::read_doc(store, path::leaderboard(room))
            .await?
            .unwrap_or_default();

    let mut outcomes = IndexMap::new();
    for (id, entry) in &board {
        let record = records.get(id);
        let selected = record.map(|r| r.selected.clone());
        let correct = selected
            .as_deref()
            .is_some_and(|option| answers_match(option, &round.answer));
        let (awarded, time_bonus) = if correct {
            award_for(record.map(|r| r.remaining_time).unwrap_or(0))
        } else {
            (0, 0)
        };

        if correct {
            let updated = PlayerEntry {
                name: entry.name.clone(),
                score: entry.score + awarded,
            };
            store::put_doc(store, path::player(room, *id), &updated).await?;
        }
        outcomes.insert(
            *id,
            PlayerOutcome {
                selected,
                correct,
                awarded,
                time_bonus,
            },
        );
    }

    let result = RoundResultDoc {
        round_id: round.round_id,
        timestamp: now_millis(),
        correct_answer: round.answer.clone(),
        players: outcomes,
    };
    store::put_doc(store, path::last_results(room), &result).await?;

    info!(room = %room, round = round.round_number, answers = records.len(), "round evaluated");
    Ok(result)
}
