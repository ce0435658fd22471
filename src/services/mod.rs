//! Room-scoped operations every participant can perform.

/// Answer submission and retrieval for the open round.
pub mod answers;
/// Room chat.
pub mod chat;
/// Presence markers and abandoned-room cleanup.
pub mod presence;
/// Room lifecycle: create, join, leave, and the public listing.
pub mod rooms;
/// Answer checking, point awards, and winner selection.
pub mod scoring;
