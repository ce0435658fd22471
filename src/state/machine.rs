use thiserror::Error;

/// High-level phases a room's round progression can be in.
///
/// Only the host's driver moves between phases; every other participant
/// observes the effects through the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round is running; the host may start one.
    #[default]
    Idle,
    /// The shared pre-game countdown is on screen.
    Starting,
    /// A round is open and accepting answers.
    Active {
        /// Identifier of the open round.
        round_id: u64,
    },
    /// The deadline passed; answers are being settled.
    Evaluating {
        /// Identifier of the round being settled.
        round_id: u64,
    },
    /// The question budget is spent; only a restart leaves this phase.
    GameOver,
}

/// Events the host's driver applies to the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// The pre-game countdown was published.
    CountdownOpened,
    /// A round document was written and is accepting answers.
    RoundOpened {
        /// Identifier of the round that opened.
        round_id: u64,
    },
    /// Starting failed before a round could open.
    StartAborted,
    /// The ticking clock ran the round down to its deadline.
    DeadlineReached,
    /// The round vanished or was replaced mid-flight.
    RoundInterrupted,
    /// The round's results were published and more rounds remain.
    ResultsPublished,
    /// The round's results were published and the budget is spent.
    BudgetExhausted,
    /// The host reset the room to a fresh lobby.
    GameRestarted,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the invalid event was received.
    pub from: RoundPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoundEvent,
}

/// Pure phase machine for round progression.
#[derive(Debug, Clone, Default)]
pub struct RoundMachine {
    phase: RoundPhase,
}

impl RoundMachine {
    /// Create a machine in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase.clone()
    }

    /// Apply an event, returning the new phase.
    pub fn apply(&mut self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = match (self.phase.clone(), event) {
            (RoundPhase::Idle, RoundEvent::CountdownOpened) => RoundPhase::Starting,
            // the countdown only precedes the first round; later rounds
            // open straight from idle
            (RoundPhase::Idle | RoundPhase::Starting, RoundEvent::RoundOpened { round_id }) => {
                RoundPhase::Active { round_id }
            }
            (RoundPhase::Starting, RoundEvent::StartAborted) => RoundPhase::Idle,
            (RoundPhase::Active { round_id }, RoundEvent::DeadlineReached) => {
                RoundPhase::Evaluating { round_id }
            }
            (RoundPhase::Active { .. }, RoundEvent::RoundInterrupted) => RoundPhase::Idle,
            (RoundPhase::Evaluating { .. }, RoundEvent::ResultsPublished) => RoundPhase::Idle,
            (RoundPhase::Evaluating { .. }, RoundEvent::BudgetExhausted) => RoundPhase::GameOver,
            (RoundPhase::GameOver, RoundEvent::GameRestarted) => RoundPhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        self.phase = next.clone();
        Ok(next)
    }
}
