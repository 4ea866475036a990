use rust_decimal::Decimal;
use thiserror::Error;

use common::keys::{DayKey, SlotKey};

/// Typed failures surfaced by engine operations.
///
/// Validation and conflict kinds are recoverable and returned to the caller;
/// `Store` means the durable write failed, the in-memory mutation was rolled
/// back, and the operation must be treated as fatal.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown day: {0}")]
    UnknownDay(DayKey),

    #[error("unknown slot: {0}")]
    UnknownSlot(SlotKey),

    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        required: Decimal,
        available: Decimal,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lifecycle inconsistency: {0}")]
    Inconsistency(String),

    #[error("store failure: {0}")]
    Store(anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
