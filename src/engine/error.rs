use crate::model::ReservationId;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Mask input of the wrong size — never coerced, always rejected.
    InvalidLength { expected: usize, got: usize },
    /// A wanted slot is already taken. Expected outcome, not a fault.
    Conflict { slot: usize },
    NotFound(String),
    AlreadySigned(ReservationId),
    /// The store did not answer within the configured bound.
    StoreTimeout,
    /// Opaque store failure; retry policy belongs to the caller.
    Persistence(String),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidLength { expected, got } => {
                write!(f, "invalid mask length: expected {expected}, got {got}")
            }
            EngineError::Conflict { slot } => {
                write!(f, "slot {slot} already reserved")
            }
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::AlreadySigned(id) => write!(f, "reservation {id} already signed in"),
            EngineError::StoreTimeout => write!(f, "store call timed out"),
            EngineError::Persistence(e) => write!(f, "persistence failure: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}
