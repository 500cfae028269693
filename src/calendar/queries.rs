use tracing::debug;

use crate::error::DeskError;
use crate::limits::{MAX_QUERY_WINDOW_MS, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;
use crate::notify::Notice;

use super::availability::free_spans;
use super::{sort_events, Calendar};

impl Calendar {
    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn operating_hours(&self) -> Option<&OperatingHours> {
        self.hours.as_ref()
    }

    /// Copy of the current event list, ordered by start.
    pub async fn events(&self) -> Vec<Booking> {
        self.events.read().await.clone()
    }

    pub(super) async fn find(&self, id: &BookingId) -> Option<Booking> {
        self.events.read().await.iter().find(|b| b.id == *id).cloned()
    }

    /// Click-to-view. Anyone may look at any booking.
    pub async fn view(&self, id: BookingId) -> Result<Booking, DeskError> {
        self.find(&id).await.ok_or(DeskError::BookingNotFound(id))
    }

    pub fn can_modify(&self, booking: &Booking) -> bool {
        match self.session.user_id() {
            Some(uid) => booking.id.is_tentative() || booking.is_owned_by(uid),
            None => false,
        }
    }

    /// Price of `span` at this studio's hourly rate.
    pub fn quote(&self, span: &Span) -> u64 {
        self.studio.quote(span)
    }

    /// Unbooked time in `window`, within opening hours when configured.
    pub async fn free_slots(&self, window: Span) -> Result<Vec<Span>, DeskError> {
        if window.start > window.end {
            return Err(DeskError::InvalidSpan(window));
        }
        if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
            return Err(DeskError::LimitExceeded("timestamp out of range"));
        }
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(DeskError::LimitExceeded("query window too wide"));
        }
        let events = self.events.read().await;
        Ok(free_spans(&events, &window, self.hours.as_ref()))
    }

    /// Reload bookings from the backend. Tentative entries are kept.
    pub async fn refresh(&self) -> Result<(), DeskError> {
        let records = match self.backend.list_bookings(self.studio.id, None).await {
            Ok(r) => r,
            Err(e) => {
                self.notify
                    .send(Notice::error("Error", format!("Failed to load studio data: {e}")));
                return Err(DeskError::Remote(e));
            }
        };

        let mut events = self.events.write().await;
        let mut fresh: Vec<Booking> = records.into_iter().map(Booking::from).collect();
        fresh.extend(events.iter().filter(|b| b.id.is_tentative()).cloned());
        sort_events(&mut fresh);
        debug!("refreshed studio {}: {} entries", self.studio.id, fresh.len());
        *events = fresh;
        Ok(())
    }
}
