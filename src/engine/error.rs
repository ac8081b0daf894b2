use ulid::Ulid;

use crate::directory::LookupError;
use crate::model::{PropertyStatus, ReservationStatus, Unavailable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Property,
    User,
    Reservation,
    BlockedRange,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Property => "property",
            Entity::User => "user",
            Entity::Reservation => "reservation",
            Entity::BlockedRange => "blocked range",
        })
    }
}

/// Input the caller can fix and resubmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalid {
    EndBeforeStart,
    StartInPast,
    MissingGuestField(&'static str),
    MalformedEmail,
    NotRentalListing,
    PropertyNotAvailable(PropertyStatus),
    ReservationNotActive(ReservationStatus),
    Transition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
}

impl Invalid {
    /// The calendar reason matching a date problem, if this is one.
    pub fn as_unavailable(&self) -> Option<Unavailable> {
        match self {
            Invalid::EndBeforeStart => Some(Unavailable::EndBeforeStart),
            Invalid::StartInPast => Some(Unavailable::StartInPast),
            _ => None,
        }
    }
}

impl std::fmt::Display for Invalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invalid::EndBeforeStart => f.write_str("end before start"),
            Invalid::StartInPast => f.write_str("start in past"),
            Invalid::MissingGuestField(field) => write!(f, "guest {field} is required"),
            Invalid::MalformedEmail => f.write_str("malformed email address"),
            Invalid::NotRentalListing => f.write_str("property is not a rental listing"),
            Invalid::PropertyNotAvailable(status) => {
                write!(f, "property is not available (status {status:?})")
            }
            Invalid::ReservationNotActive(status) => {
                write!(f, "reservation is {status}, only active reservations can change dates")
            }
            Invalid::Transition { from, to } => {
                write!(f, "invalid status transition {from} -> {to}")
            }
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(Invalid),
    NotFound(Entity, Ulid),
    Conflict(Unavailable),
    LimitExceeded(&'static str),
    Lookup(String),
    WalError(String),
}

impl EngineError {
    /// Short machine-readable class for the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(..) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::LimitExceeded(_) => "limit",
            EngineError::Lookup(_) | EngineError::WalError(_) => "internal",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(invalid) => write!(f, "{invalid}"),
            EngineError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            EngineError::Conflict(reason) => write!(f, "{reason}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Lookup(e) => write!(f, "directory error: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<Invalid> for EngineError {
    fn from(invalid: Invalid) -> Self {
        EngineError::Validation(invalid)
    }
}

impl From<LookupError> for EngineError {
    fn from(e: LookupError) -> Self {
        EngineError::Lookup(e.0)
    }
}
