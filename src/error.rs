//! Errors surfaced by room and round operations.

use thiserror::Error;
use validator::ValidationErrors;

use crate::model::RoomCode;
use crate::questions::QuestionError;
use crate::store::StoreError;

/// Why a room or round operation could not proceed.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No room exists under this code.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),
    /// The round is no longer accepting answers.
    #[error("the round is closed")]
    RoundClosed,
    /// The submitted room settings were rejected.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// No free room code was found after the allotted attempts.
    #[error("could not allocate an unused room code")]
    CodeAllocation,
    /// The question supply failed.
    #[error("question supply failed")]
    Questions(#[from] QuestionError),
    /// A store operation failed.
    #[error("store operation failed")]
    Store(#[from] StoreError),
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::InvalidSettings(errors.to_string())
    }
}
