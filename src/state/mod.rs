//! Round progression: the phase machine, the host-side driver that runs it,
//! and the watchers every participant uses to follow along.

/// Countdown display derived from the shared anchor.
pub mod countdown;
/// Host-side task driving rounds from start to game over.
pub mod driver;
/// Pure phase machine behind the driver.
pub mod machine;
/// Live decoded view of a room for non-host participants.
pub mod view;

pub use driver::HostAuthority;
pub use machine::{InvalidTransition, RoundEvent, RoundMachine, RoundPhase};
pub use view::{RoomView, RoomWatcher};
