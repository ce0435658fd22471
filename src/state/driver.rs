//! Host-side round driver.
//!
//! One task per room, owned by the host's process, is the single writer for
//! round-critical state: the round document, its once-per-second remaining
//! time, the round index, scores, the game-over flag, and the winner. Other
//! participants never write these; they watch the store.
//!
//! The driver applies every transition to [`RoundMachine`] and broadcasts
//! the resulting phase. Store effects always land before the broadcast, so
//! an observer woken by a phase change reads consistent state.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::{self, PREROUND_COUNTDOWN_SECS, REVEAL_DELAY};
use crate::error::ServiceError;
use crate::model::{CountdownAnchor, ParticipantId, PlayerEntry, RoomDoc, RoundDoc, now_millis};
use crate::questions::QuestionBank;
use crate::services::scoring;
use crate::session::SessionContext;
use crate::state::machine::{RoundEvent, RoundMachine, RoundPhase};
use crate::store::{self, path};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum HostCommand {
    StartRound,
    RestartGame,
}

/// Handle to a room's round driver, held by the host alone.
///
/// Non-host participants never get one, which is what makes round control
/// host-only; there is no identity check at call time.
#[derive(Debug, Clone)]
pub struct HostAuthority {
    commands: mpsc::UnboundedSender<HostCommand>,
    phase: watch::Receiver<RoundPhase>,
}

impl HostAuthority {
    /// Start the next round. Ignored unless the room is idle.
    pub fn start_round(&self) {
        if self.commands.send(HostCommand::StartRound).is_err() {
            warn!("round driver is gone; command dropped");
        }
    }

    /// Reset a finished game to a fresh lobby. Ignored unless the game is
    /// over.
    pub fn restart_game(&self) {
        if self.commands.send(HostCommand::RestartGame).is_err() {
            warn!("round driver is gone; command dropped");
        }
    }

    /// Live feed of the driver's phase.
    pub fn phase(&self) -> watch::Receiver<RoundPhase> {
        self.phase.clone()
    }

    /// The phase right now.
    pub fn current_phase(&self) -> RoundPhase {
        self.phase.borrow().clone()
    }
}

/// Spawn the driver task for a freshly created room.
pub(crate) fn spawn(ctx: SessionContext, bank: QuestionBank) -> HostAuthority {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (phase_tx, phase_rx) = watch::channel(RoundPhase::Idle);
    let driver = RoundDriver {
        ctx,
        bank,
        machine: RoundMachine::new(),
        phase: phase_tx,
        commands: command_rx,
        last_round_id: 0,
    };
    tokio::spawn(driver.run());
    HostAuthority {
        commands: command_tx,
        phase: phase_rx,
    }
}

enum TickOutcome {
    /// The round ran down; this is the document read at the deadline.
    Deadline(RoundDoc),
    /// The round vanished, was replaced, or was closed by someone else.
    Interrupted,
    /// Every command handle is gone.
    HostGone,
}

struct RoundDriver {
    ctx: SessionContext,
    bank: QuestionBank,
    machine: RoundMachine,
    phase: watch::Sender<RoundPhase>,
    commands: mpsc::UnboundedReceiver<HostCommand>,
    last_round_id: u64,
}

impl RoundDriver {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                HostCommand::StartRound => {
                    if self.machine.phase() == RoundPhase::Idle {
                        self.play().await;
                    } else {
                        warn!(room = %self.ctx.room(), phase = ?self.machine.phase(), "start command dropped");
                    }
                }
                HostCommand::RestartGame => {
                    if self.machine.phase() == RoundPhase::GameOver {
                        match self.reset_room().await {
                            Ok(()) => {
                                self.advance(RoundEvent::GameRestarted);
                                info!(room = %self.ctx.room(), "game reset to a fresh lobby");
                            }
                            Err(err) => {
                                warn!(room = %self.ctx.room(), error = %err, "game restart failed");
                            }
                        }
                    } else {
                        warn!(room = %self.ctx.room(), phase = ?self.machine.phase(), "restart command dropped");
                    }
                }
            }
        }
    }

    /// Run rounds back to back from one start command until the game is
    /// over, a round is interrupted, or the host disappears.
    async fn play(&mut self) {
        match self.run_countdown().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                warn!(room = %self.ctx.room(), error = %err, "pre-game countdown failed");
                if self.machine.phase() == RoundPhase::Starting {
                    self.advance(RoundEvent::StartAborted);
                }
                return;
            }
        }

        loop {
            let round = match self.open_round().await {
                Ok(round) => round,
                Err(err) => {
                    warn!(room = %self.ctx.room(), error = %err, "round start failed");
                    if self.machine.phase() == RoundPhase::Starting {
                        self.advance(RoundEvent::StartAborted);
                    }
                    return;
                }
            };

            match self.run_ticks(round.round_id).await {
                TickOutcome::HostGone => return,
                TickOutcome::Interrupted => {
                    self.advance(RoundEvent::RoundInterrupted);
                    return;
                }
                TickOutcome::Deadline(closing) => {
                    self.advance(RoundEvent::DeadlineReached);
                    match self.settle(&closing).await {
                        Ok(true) => {}
                        Ok(false) => return,
                        Err(err) => {
                            warn!(room = %self.ctx.room(), error = %err, "round evaluation failed");
                            if matches!(self.machine.phase(), RoundPhase::Evaluating { .. }) {
                                self.advance(RoundEvent::ResultsPublished);
                            }
                            return;
                        }
                    }
                }
            }

            if !self.pause_for(REVEAL_DELAY).await {
                return;
            }
        }
    }

    /// Only the first round of a game gets the shared countdown; later
    /// rounds open directly. Resolves to false when the host vanished
    /// mid-countdown.
    async fn run_countdown(&mut self) -> Result<bool, ServiceError> {
        if self.read_round_index().await? > 0 {
            return Ok(true);
        }

        self.advance(RoundEvent::CountdownOpened);
        let anchor = CountdownAnchor {
            start_at: now_millis(),
            duration: PREROUND_COUNTDOWN_SECS,
        };
        store::put_doc(self.ctx.store(), path::countdown(self.ctx.room()), &anchor).await?;
        let alive = self
            .pause_for(Duration::from_secs(u64::from(PREROUND_COUNTDOWN_SECS)))
            .await;
        self.ctx
            .store()
            .delete(path::countdown(self.ctx.room()))
            .await?;
        Ok(alive)
    }

    /// Write a fresh round document and open it for answers.
    async fn open_round(&mut self) -> Result<RoundDoc, ServiceError> {
        let doc: RoomDoc = store::read_doc(self.ctx.store(), path::room(self.ctx.room()))
            .await?
            .ok_or_else(|| ServiceError::RoomNotFound(self.ctx.room().clone()))?;
        let index = self.read_round_index().await?;
        let question = self.bank.next().await?;

        let round_id = self.next_round_id();
        let budget = config::time_budget_secs(doc.settings.difficulty);
        let round = RoundDoc {
            question: question.question,
            options: question.options,
            answer: question.answer,
            category: question.category,
            remaining_time: budget,
            total_time: budget,
            round_active: true,
            round_id,
            round_number: index + 1,
        };
        store::put_doc(self.ctx.store(), path::current_round(self.ctx.room()), &round).await?;
        self.ctx
            .store()
            .put(path::round_index(self.ctx.room()), Value::from(index + 1))
            .await?;
        self.ctx
            .store()
            .put(path::game_over(self.ctx.room()), Value::Bool(false))
            .await?;

        self.advance(RoundEvent::RoundOpened { round_id });
        info!(
            room = %self.ctx.room(),
            round = round.round_number,
            category = %round.category,
            "round opened"
        );
        Ok(round)
    }

    /// Tick the open round once per second until its deadline or
    /// interruption. Commands sent while a round runs are rejected here.
    async fn run_ticks(&mut self, round_id: u64) -> TickOutcome {
        let mut ticks = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        warn!(room = %self.ctx.room(), ?command, "command dropped while a round is active");
                    }
                    None => return TickOutcome::HostGone,
                },
                _ = ticks.tick() => match self.tick(round_id).await {
                    Ok(Some(outcome)) => return outcome,
                    Ok(None) => {}
                    Err(err) => {
                        warn!(room = %self.ctx.room(), error = %err, "round tick failed");
                    }
                },
            }
        }
    }

    /// One second of round time. `Some(outcome)` ends the ticking loop.
    async fn tick(&mut self, round_id: u64) -> Result<Option<TickOutcome>, ServiceError> {
        let round: Option<RoundDoc> =
            store::read_doc(self.ctx.store(), path::current_round(self.ctx.room())).await?;
        let Some(round) = round else {
            return Ok(Some(TickOutcome::Interrupted));
        };
        if round.round_id != round_id || !round.round_active {
            return Ok(Some(TickOutcome::Interrupted));
        }
        if round.remaining_time <= 1 {
            // the deadline fires straight from one remaining second; the
            // zero is written by evaluation when it closes the round
            return Ok(Some(TickOutcome::Deadline(round)));
        }

        let mut fields = Map::new();
        fields.insert(
            "remainingTime".to_string(),
            Value::from(round.remaining_time - 1),
        );
        self.ctx
            .store()
            .update(path::current_round(self.ctx.room()), fields)
            .await?;
        Ok(None)
    }

    /// Settle the round that just hit its deadline. Resolves to whether
    /// more rounds remain in the budget.
    async fn settle(&mut self, round: &RoundDoc) -> Result<bool, ServiceError> {
        scoring::evaluate_round(&self.ctx, round).await?;

        let index = self.read_round_index().await?;
        let doc: RoomDoc = store::read_doc(self.ctx.store(), path::room(self.ctx.room()))
            .await?
            .ok_or_else(|| ServiceError::RoomNotFound(self.ctx.room().clone()))?;

        if index >= doc.settings.question_count {
            let outcome = self.finish_game().await;
            self.advance(RoundEvent::BudgetExhausted);
            outcome?;
            Ok(false)
        } else {
            self.advance(RoundEvent::ResultsPublished);
            Ok(true)
        }
    }

    /// Raise the game-over flag and record the winner.
    async fn finish_game(&mut self) -> Result<(), ServiceError> {
        self.ctx
            .store()
            .put(path::game_over(self.ctx.room()), Value::Bool(true))
            .await?;
        let board: IndexMap<ParticipantId, PlayerEntry> =
            store::read_doc(self.ctx.store(), path::leaderboard(self.ctx.room()))
                .await?
                .unwrap_or_default();
        match scoring::pick_winner(&board) {
            Some(winner) => {
                store::put_doc(self.ctx.store(), path::winner(self.ctx.room()), &winner).await?;
                info!(
                    room = %self.ctx.room(),
                    winner = %winner.name,
                    score = winner.score,
                    "game over"
                );
            }
            None => warn!(room = %self.ctx.room(), "game over with an empty leaderboard"),
        }
        Ok(())
    }

    /// Zero every score and clear round state so the next start behaves
    /// like a brand new game, shared countdown included.
    async fn reset_room(&mut self) -> Result<(), ServiceError> {
        let room = self.ctx.room().clone();
        let board: IndexMap<ParticipantId, PlayerEntry> =
            store::read_doc(self.ctx.store(), path::leaderboard(&room))
                .await?
                .unwrap_or_default();
        for id in board.keys() {
            let mut fields = Map::new();
            fields.insert("score".to_string(), Value::from(0));
            self.ctx
                .store()
                .update(path::player(&room, *id), fields)
                .await?;
        }
        self.ctx.store().delete(path::current_round(&room)).await?;
        self.ctx.store().delete(path::last_results(&room)).await?;
        self.ctx.store().delete(path::winner(&room)).await?;
        self.ctx
            .store()
            .put(path::round_index(&room), Value::from(0))
            .await?;
        self.ctx
            .store()
            .put(path::game_over(&room), Value::Bool(false))
            .await?;
        Ok(())
    }

    /// Wait out a host-side delay, draining commands that cannot apply
    /// mid-delay. Resolves to false when every command handle is gone.
    async fn pause_for(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        warn!(room = %self.ctx.room(), ?command, "command dropped between rounds");
                    }
                    None => return false,
                },
            }
        }
    }

    async fn read_round_index(&self) -> Result<u32, ServiceError> {
        let value = self
            .ctx
            .store()
            .read(path::round_index(self.ctx.room()))
            .await?;
        Ok(value.as_ref().and_then(Value::as_u64).unwrap_or(0) as u32)
    }

    /// Round ids are wall-clock milliseconds, nudged forward when two
    /// rounds open within the same millisecond.
    fn next_round_id(&mut self) -> u64 {
        let id = now_millis().max(self.last_round_id + 1);
        self.last_round_id = id;
        id
    }

    /// Apply a transition and broadcast the new phase.
    fn advance(&mut self, event: RoundEvent) {
        match self.machine.apply(event) {
            Ok(next) => {
                let _ = self.phase.send(next);
            }
            Err(err) => {
                warn!(room = %self.ctx.room(), error = %err, "phase transition rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Difficulty, RoomCode};
    use crate::questions::StaticSource;
    use crate::session::ClientSession;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn round_ids_never_repeat() {
        let store = MemoryStore::new();
        let session = ClientSession::new(Arc::new(store.client()), "Ana");
        let ctx = SessionContext::new(session, RoomCode::parse("ABCDEF").unwrap());
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let (phase_tx, _phase_rx) = watch::channel(RoundPhase::Idle);
        let mut driver = RoundDriver {
            ctx,
            bank: QuestionBank::new(Arc::new(StaticSource::sample()), 9, Difficulty::Easy, 2),
            machine: RoundMachine::new(),
            phase: phase_tx,
            commands: command_rx,
            last_round_id: 0,
        };

        let first = driver.next_round_id();
        let second = driver.next_round_id();
        let third = driver.next_round_id();
        assert!(first < second && second < third);
    }
}
