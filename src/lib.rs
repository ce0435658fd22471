//! Multiplayer trivia session engine: rooms, host-driven rounds, scoring,
//! presence-based cleanup, and chat, all coordinated through a shared
//! realtime store.

pub mod config;
pub mod error;
pub mod model;
pub mod questions;
pub mod services;
pub mod session;
pub mod state;
pub mod store;
