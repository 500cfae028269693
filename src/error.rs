use ulid::Ulid;

use crate::backend::BackendError;
use crate::model::{BookingId, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskError {
    /// The candidate interval overlaps a known booking. Detected locally.
    Conflict { with: BookingId },
    Unauthorized(&'static str),
    /// The backend rejected or failed the call.
    Remote(BackendError),
    BookingNotFound(BookingId),
    StudioNotFound(Ulid),
    AlreadyConfirmed(BookingId),
    InvalidSpan(Span),
    OutsideOperatingHours(Span),
    LimitExceeded(&'static str),
    Invalid(&'static str),
}

impl DeskError {
    /// Title of the notice raised for this error.
    pub fn notice_title(&self) -> &'static str {
        match self {
            DeskError::Conflict { .. } => "Booking Conflict",
            DeskError::Unauthorized(_) => "Access Denied",
            DeskError::InvalidSpan(_) | DeskError::OutsideOperatingHours(_) => "Invalid Selection",
            _ => "Error",
        }
    }
}

impl std::fmt::Display for DeskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeskError::Conflict { .. } => {
                write!(f, "This time slot overlaps with an existing booking")
            }
            DeskError::Unauthorized(msg) => write!(f, "{msg}"),
            DeskError::Remote(e) => write!(f, "{e}"),
            DeskError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            DeskError::StudioNotFound(id) => write!(f, "studio not found: {id}"),
            DeskError::AlreadyConfirmed(id) => write!(f, "booking {id} is already confirmed"),
            DeskError::InvalidSpan(span) => {
                write!(f, "invalid time range [{}, {})", span.start, span.end)
            }
            DeskError::OutsideOperatingHours(span) => {
                write!(f, "[{}, {}) is outside opening hours", span.start, span.end)
            }
            DeskError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            DeskError::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DeskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeskError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for DeskError {
    fn from(e: BackendError) -> Self {
        DeskError::Remote(e)
    }
}
