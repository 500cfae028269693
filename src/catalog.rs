//! Read-side views over the studio collection: search, featured list,
//! live status, and a user's own bookings.

use futures::future::try_join_all;
use tracing::debug;

use crate::calendar::SharedBackend;
use crate::error::DeskError;
use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudioFilter {
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
    pub category: Option<StudioCategory>,
}

impl StudioFilter {
    pub fn matches(&self, studio: &Studio) -> bool {
        if let Some(category) = self.category
            && studio.category != category
        {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                studio.name.to_lowercase().contains(&term)
                    || studio.description.to_lowercase().contains(&term)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioStatus {
    AvailableNow,
    CurrentlyOccupied,
    CurrentlyClosed,
}

impl StudioStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StudioStatus::AvailableNow => "Available Now",
            StudioStatus::CurrentlyOccupied => "Currently Occupied",
            StudioStatus::CurrentlyClosed => "Currently Closed",
        }
    }
}

/// A booking of the signed-in user with its studio, if that still exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnBooking {
    pub booking: Booking,
    pub studio: Option<Studio>,
}

pub struct Catalog {
    backend: SharedBackend,
    hours: OperatingHours,
}

impl Catalog {
    pub fn new(backend: SharedBackend, hours: OperatingHours) -> Self {
        Self { backend, hours }
    }

    pub async fn list(&self, filter: &StudioFilter) -> Result<Vec<Studio>, DeskError> {
        let studios = self.backend.list_studios().await?;
        Ok(studios.into_iter().filter(|s| filter.matches(s)).collect())
    }

    pub async fn featured(&self, n: usize) -> Result<Vec<Studio>, DeskError> {
        let mut studios = self.backend.list_studios().await?;
        studios.truncate(n);
        Ok(studios)
    }

    /// Status of every studio at `now`.
    pub async fn statuses(&self, now: Ms) -> Result<Vec<(Studio, StudioStatus)>, DeskError> {
        if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&now) {
            return Err(DeskError::LimitExceeded("timestamp out of range"));
        }
        let studios = self.backend.list_studios().await?;
        if !self.hours.is_open_at(now) {
            return Ok(studios
                .into_iter()
                .map(|s| (s, StudioStatus::CurrentlyClosed))
                .collect());
        }

        let hour_start = now - now.rem_euclid(HOUR_MS);
        let current_hour = Span::new(hour_start, hour_start + HOUR_MS);
        let backend = &self.backend;
        let occupancy = try_join_all(
            studios
                .iter()
                .map(|s| backend.list_bookings(s.id, Some(current_hour))),
        )
        .await?;

        debug!("computed status for {} studios at {now}", studios.len());
        Ok(studios
            .into_iter()
            .zip(occupancy)
            .map(|(s, bookings)| {
                let status = if bookings.is_empty() {
                    StudioStatus::AvailableNow
                } else {
                    StudioStatus::CurrentlyOccupied
                };
                (s, status)
            })
            .collect())
    }

    /// Bookings owned by the session user, ordered by start.
    pub async fn my_bookings(&self, session: &Session) -> Result<Vec<OwnBooking>, DeskError> {
        let Some(user_id) = session.user_id() else {
            return Err(DeskError::Unauthorized("Sign in to see your bookings"));
        };
        let records = self.backend.list_bookings_by_owner(user_id).await?;
        let studios = self.backend.list_studios().await?;
        Ok(records
            .into_iter()
            .map(|rec| {
                let studio = studios.iter().find(|s| s.id == rec.studio_id).cloned();
                OwnBooking {
                    booking: Booking::from(rec),
                    studio,
                }
            })
            .collect())
    }
}
