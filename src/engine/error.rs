use thiserror::Error;
use ulid::Ulid;

use crate::model::{IntervalError, Ms};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid interval: {0}")]
    InvalidInterval(#[from] IntervalError),
    #[error("interval starts in the past (start {start}, now {now})")]
    IntervalInThePast { start: Ms, now: Ms },
    #[error("resource not found: {0}")]
    ResourceNotFound(Ulid),
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("resource name already taken: {0}")]
    DuplicateName(String),
    #[error("conflict with booking: {0}")]
    IntervalConflict(Ulid),
    #[error("booking {0} belongs to another requester")]
    NotOwner(Ulid),
    #[error("cannot delete resource {0}: has active bookings")]
    ResourceHasActiveBookings(Ulid),
    #[error("invalid resource name: {0:?}")]
    InvalidName(String),
    #[error("capacity must be positive")]
    InvalidCapacity,
    #[error("status filter must hold one or two distinct values, got {0}")]
    InvalidStatusFilter(usize),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Short label for the `reason` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval(_) => "invalid_interval",
            EngineError::IntervalInThePast { .. } => "in_the_past",
            EngineError::ResourceNotFound(_) => "resource_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::DuplicateName(_) => "duplicate_name",
            EngineError::IntervalConflict(_) => "conflict",
            EngineError::NotOwner(_) => "not_owner",
            EngineError::ResourceHasActiveBookings(_) => "has_active_bookings",
            EngineError::InvalidName(_) => "invalid_name",
            EngineError::InvalidCapacity => "invalid_capacity",
            EngineError::InvalidStatusFilter(_) => "invalid_status_filter",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}
