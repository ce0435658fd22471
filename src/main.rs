//! Demo binary: two simulated clients play a short game end to end over the
//! in-process store, logging what each participant observes.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_rally::model::{Difficulty, format_millis};
use quiz_rally::questions::{QuestionSource, StaticSource};
use quiz_rally::services::{answers, chat, rooms};
use quiz_rally::session::{ClientSession, SessionContext};
use quiz_rally::state::{RoomWatcher, RoundPhase};
use quiz_rally::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let backend = MemoryStore::new();
    let questions: Arc<dyn QuestionSource> = Arc::new(StaticSource::sample());

    let host = ClientSession::new(Arc::new(backend.client()), "Nova");
    let request = rooms::CreateRoomRequest {
        category_id: 9,
        difficulty: Difficulty::Hard,
        question_count: 3,
    };
    let (host_ctx, authority) = rooms::create_room(&host, request, questions)
        .await
        .context("creating the room")?;

    let mut listing = rooms::watch_public_rooms(Arc::new(backend.client()));
    if listing.changed().await.is_ok() {
        for (code, summary) in listing.borrow().iter() {
            info!(
                room = %code,
                host = %summary.host_name,
                players = summary.players,
                created = %format_millis(summary.created_at),
                "open room"
            );
        }
    }

    // a blank name gets a generated Player-xxxxx one
    let guest = ClientSession::new(Arc::new(backend.client()), "");
    let guest_ctx = rooms::join_room(&guest, host_ctx.room().clone())
        .await
        .context("joining the room")?;

    chat::post_message(&host_ctx, "welcome to the rally")
        .await
        .context("posting chat")?;
    chat::post_message(&guest_ctx, "glhf")
        .await
        .context("posting chat")?;

    let responder = tokio::spawn(answer_rounds(guest_ctx.clone()));

    authority.start_round();

    let mut phase = authority.phase();
    phase
        .wait_for(|phase| *phase == RoundPhase::GameOver)
        .await
        .context("waiting for the game to end")?;

    let mut watcher = RoomWatcher::spawn(&host_ctx)
        .await
        .context("watching the finished room")?;
    let finale = watcher
        .wait_for(|view| view.game_over)
        .await
        .context("reading the final view")?;
    for (id, entry) in &finale.leaderboard {
        info!(player = %entry.name, id = %id, score = entry.score, "final score");
    }
    if let Some(winner) = &finale.winner {
        info!(winner = %winner.name, score = winner.score, "winner takes the rally");
    }
    for message in &finale.chat {
        info!(from = %message.user, at = %format_millis(message.timestamp), "{}", message.text);
    }

    responder.await.context("joining the player task")?;

    rooms::leave_room(&guest_ctx).await.context("guest leaving")?;
    rooms::leave_room(&host_ctx).await.context("host leaving")?;
    info!("demo complete");
    Ok(())
}

/// Follow the room and answer every round as soon as it opens.
///
/// The round document carries the correct option so observers can render
/// reveals; answer tamper-proofing is not this engine's concern, which the
/// demo puts to cheerful use.
async fn answer_rounds(ctx: SessionContext) {
    let mut watcher = match RoomWatcher::spawn(&ctx).await {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %err, "player watcher failed to start");
            return;
        }
    };

    let mut answered = 0u64;
    loop {
        let view = match watcher
            .wait_for(|view| {
                view.room.is_none()
                    || view.game_over
                    || view
                        .round
                        .as_ref()
                        .is_some_and(|round| round.round_active && round.round_id > answered)
            })
            .await
        {
            Ok(view) => view,
            Err(_) => break,
        };
        if view.room.is_none() || view.game_over {
            break;
        }
        let Some(round) = view.round else { continue };

        answered = round.round_id;
        match answers::submit_answer(&ctx, round.answer.clone()).await {
            Ok(()) => {
                info!(
                    player = %ctx.name(),
                    round = round.round_number,
                    answer = %round.answer,
                    "answered"
                );
            }
            Err(err) => warn!(error = %err, "answer was not accepted"),
        }
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
