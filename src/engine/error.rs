use crate::model::{ReservationId, ReservationStatus, ResourceId};

#[derive(Debug)]
pub enum EngineError {
    NotFound(String),
    AlreadyExists(ResourceId),
    /// `end <= start`.
    InvalidInterval,
    /// The resource offers no hourly rate.
    NoRateAvailable(ResourceId),
    /// Overlaps an existing reservation in pending/confirmed/active.
    SlotConflict(ReservationId),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    UnknownStatus(String),
    CancellationWindowClosed,
    ReferenceExhausted,
    ResourceInactive(ResourceId),
    SelfBooking,
    Forbidden,
    InvalidRequest(&'static str),
    LimitExceeded(&'static str),
    PersistenceFailure(String),
}

impl EngineError {
    pub fn resource_not_found(id: ResourceId) -> Self {
        EngineError::NotFound(format!("resource {id}"))
    }

    pub fn reservation_not_found(id: ReservationId) -> Self {
        EngineError::NotFound(format!("reservation {id}"))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::AlreadyExists(id) => write!(f, "resource already exists: {id}"),
            EngineError::InvalidInterval => write!(f, "end time must be after start time"),
            EngineError::NoRateAvailable(id) => {
                write!(f, "resource {id} has no hourly rate")
            }
            EngineError::SlotConflict(id) => {
                write!(f, "time slot already booked (conflicts with reservation {id})")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move reservation from {from} to {to}")
            }
            EngineError::UnknownStatus(s) => write!(f, "unknown reservation status: {s:?}"),
            EngineError::CancellationWindowClosed => {
                write!(f, "reservation can no longer be cancelled")
            }
            EngineError::ReferenceExhausted => {
                write!(f, "could not allocate a unique booking reference")
            }
            EngineError::ResourceInactive(id) => write!(f, "resource {id} is not active"),
            EngineError::SelfBooking => write!(f, "cannot book your own parking space"),
            EngineError::Forbidden => write!(f, "not permitted for this user"),
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::PersistenceFailure(e) => write!(f, "persistence failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
