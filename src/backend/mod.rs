//! The remote system of record: booking and studio collections plus auth.
//!
//! Everything the booking core knows about persistence goes through
//! [`BookingBackend`]. [`MemoryBackend`] is the in-process implementation.

mod memory;

pub use memory::{BackendOptions, MemoryBackend};

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network or service outage.
    Unavailable(String),
    /// Authentication or permission failure at the service level.
    Forbidden(String),
    /// A store constraint rejected the write.
    Constraint(String),
    NotFound(Ulid),
    Invalid(String),
    Storage(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Unavailable(msg) => write!(f, "service unavailable: {msg}"),
            BackendError::Forbidden(msg) => write!(f, "{msg}"),
            BackendError::Constraint(msg) => write!(f, "{msg}"),
            BackendError::NotFound(id) => write!(f, "record not found: {id}"),
            BackendError::Invalid(msg) => write!(f, "{msg}"),
            BackendError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

#[async_trait]
pub trait BookingBackend: Send + Sync {
    /// The authenticated user behind this client, if any.
    async fn current_user(&self) -> Result<Option<User>, BackendError>;

    /// Bookings of a studio ordered by start. With a window, only bookings
    /// overlapping it are returned.
    async fn list_bookings(
        &self,
        studio_id: StudioId,
        window: Option<Span>,
    ) -> Result<Vec<BookingRecord>, BackendError>;

    async fn list_bookings_by_owner(&self, owner_id: UserId) -> Result<Vec<BookingRecord>, BackendError>;

    async fn insert_booking(&self, booking: NewBooking) -> Result<BookingRecord, BackendError>;

    async fn update_booking(&self, id: Ulid, patch: BookingPatch) -> Result<BookingRecord, BackendError>;

    async fn delete_booking(&self, id: Ulid) -> Result<(), BackendError>;

    /// All studios ordered by name.
    async fn list_studios(&self) -> Result<Vec<Studio>, BackendError>;

    async fn get_studio(&self, id: StudioId) -> Result<Option<Studio>, BackendError>;

    async fn insert_studio(&self, draft: StudioDraft) -> Result<Studio, BackendError>;

    async fn update_studio(&self, id: StudioId, draft: StudioDraft) -> Result<Studio, BackendError>;

    async fn delete_studio(&self, id: StudioId) -> Result<(), BackendError>;
}

impl Session {
    /// Build a session from whoever the backend says is signed in.
    pub async fn resolve(backend: &dyn BookingBackend) -> Result<Session, BackendError> {
        Ok(match backend.current_user().await? {
            Some(user) => Session::signed_in(user),
            None => Session::anonymous(),
        })
    }
}
