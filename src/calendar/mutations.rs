use tracing::debug;

use crate::error::DeskError;
use crate::model::*;
use crate::notify::Notice;

use super::conflict::{find_conflict, validate_details, validate_span};
use super::{sort_events, Attempt, Calendar, MutationKind};

const SIGN_IN_REQUIRED: &str = "Sign in to book a studio";
const NOT_YOUR_BOOKING: &str = "You can only modify your own bookings";
const NOT_YOUR_BOOKING_DELETE: &str = "You can only delete your own bookings";

fn replace_by_id(events: &mut [Booking], id: BookingId, updated: Booking) {
    if let Some(slot) = events.iter_mut().find(|b| b.id == id) {
        *slot = updated;
    }
}

impl Calendar {
    /// Start a new booking: add a tentative entry for `span`.
    ///
    /// Nothing is sent to the backend until [`Calendar::confirm`].
    pub async fn select(&self, span: Span) -> Result<BookingId, DeskError> {
        let kind = MutationKind::Create;
        if self.session.user().is_none() {
            return Err(self.reject(kind, DeskError::Unauthorized(SIGN_IN_REQUIRED)));
        }
        if let Err(e) = self.check_selectable(&span) {
            return Err(self.reject(kind, e));
        }

        let mut events = self.events.write().await;
        if let Some(with) = find_conflict(&span, &events, None).map(|b| b.id) {
            drop(events);
            return Err(self.reject(kind, DeskError::Conflict { with }));
        }
        let booking = Booking::tentative(self.studio.id, span);
        let id = booking.id;
        events.push(booking);
        sort_events(&mut events);
        debug!("selected {id} [{}, {}) on studio {}", span.start, span.end, self.studio.id);
        Ok(id)
    }

    fn check_selectable(&self, span: &Span) -> Result<(), DeskError> {
        validate_span(span)?;
        if let Some(hours) = &self.hours
            && !hours.allows(span)
        {
            return Err(DeskError::OutsideOperatingHours(*span));
        }
        Ok(())
    }

    /// Persist a tentative booking. On success the entry carries the
    /// backend's id; on failure it is removed.
    pub async fn confirm(
        &self,
        id: BookingId,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Booking, DeskError> {
        let kind = MutationKind::Create;
        let Some(user_id) = self.session.user_id() else {
            return Err(self.reject(kind, DeskError::Unauthorized(SIGN_IN_REQUIRED)));
        };
        if !id.is_tentative() {
            return Err(self.reject(kind, DeskError::AlreadyConfirmed(id)));
        }
        if let Err(e) = validate_details(title.as_deref(), description.as_deref()) {
            return Err(self.reject(kind, e));
        }
        let Some(tentative) = self.find(&id).await else {
            return Err(self.reject(kind, DeskError::BookingNotFound(id)));
        };

        let mut attempt = Attempt::start(self, kind, id, |_| {}).await;

        // Something else may have landed on the slot since it was selected.
        if let Some(with) = find_conflict(&tentative.span, attempt.snapshot(), Some(&id)).map(|b| b.id) {
            return Err(attempt.roll_back(DeskError::Conflict { with }).await);
        }

        let new = NewBooking {
            studio_id: self.studio.id,
            owner_id: user_id,
            span: tentative.span,
            title,
            description,
        };
        match attempt.remote("insert_booking", self.backend.insert_booking(new)).await {
            Ok(record) => {
                let confirmed = Booking::from(record);
                let local = confirmed.clone();
                attempt
                    .commit(
                        move |events| {
                            events.retain(|b| b.id != id);
                            events.push(local);
                        },
                        Some(Notice::success(kind.success_message())),
                    )
                    .await;
                Ok(confirmed)
            }
            Err(e) => Err(attempt.roll_back(DeskError::Remote(e)).await),
        }
    }

    /// Drop a tentative booking without contacting the backend.
    /// Returns false if `id` is not a tentative entry of this calendar.
    pub async fn abandon(&self, id: BookingId) -> bool {
        if !id.is_tentative() {
            return false;
        }
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|b| b.id != id);
        let dropped = events.len() != before;
        if dropped {
            debug!("abandoned {id}");
        }
        dropped
    }

    /// Select and confirm in one go.
    pub async fn book(
        &self,
        span: Span,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Booking, DeskError> {
        let id = self.select(span).await?;
        self.confirm(id, title, description).await
    }

    /// Drag a booking to a new time range.
    pub async fn move_booking(&self, id: BookingId, span: Span) -> Result<Booking, DeskError> {
        self.reschedule(MutationKind::Move, id, span).await
    }

    /// Change a booking's start and/or end.
    pub async fn resize(&self, id: BookingId, span: Span) -> Result<Booking, DeskError> {
        self.reschedule(MutationKind::Resize, id, span).await
    }

    async fn reschedule(&self, kind: MutationKind, id: BookingId, span: Span) -> Result<Booking, DeskError> {
        let current = self.authorize(kind, &id).await?;
        if let Err(e) = validate_span(&span) {
            return Err(self.reject(kind, e));
        }

        let mut attempt = Attempt::start(self, kind, id, |events| {
            if let Some(b) = events.iter_mut().find(|b| b.id == id) {
                b.span = span;
            }
        })
        .await;

        if let Some(with) = find_conflict(&span, attempt.snapshot(), Some(&id)).map(|b| b.id) {
            return Err(attempt.roll_back(DeskError::Conflict { with }).await);
        }

        let Some(remote_id) = id.remote() else {
            attempt.commit(|_| {}, None).await;
            return Ok(Booking { span, ..current });
        };

        match attempt
            .remote("update_booking", self.backend.update_booking(remote_id, BookingPatch::reschedule(span)))
            .await
        {
            Ok(record) => {
                let updated = Booking::from(record);
                let local = updated.clone();
                attempt
                    .commit(
                        move |events| replace_by_id(events, id, local),
                        Some(Notice::success(kind.success_message())),
                    )
                    .await;
                Ok(updated)
            }
            Err(e) => Err(attempt.roll_back(DeskError::Remote(e)).await),
        }
    }

    /// Change title and/or description. `None` leaves a field as it is.
    pub async fn edit(
        &self,
        id: BookingId,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Booking, DeskError> {
        let kind = MutationKind::EditFields;
        let current = self.authorize(kind, &id).await?;
        if let Err(e) = validate_details(title.as_deref(), description.as_deref()) {
            return Err(self.reject(kind, e));
        }

        let mut edited = current;
        if let Some(ref t) = title {
            edited.title = Some(t.clone());
        }
        if let Some(ref d) = description {
            edited.description = Some(d.clone());
        }

        let local = edited.clone();
        let mut attempt = Attempt::start(self, kind, id, move |events| replace_by_id(events, id, local)).await;

        let Some(remote_id) = id.remote() else {
            attempt.commit(|_| {}, None).await;
            return Ok(edited);
        };

        match attempt
            .remote("update_booking", self.backend.update_booking(remote_id, BookingPatch::details(title, description)))
            .await
        {
            Ok(record) => {
                let updated = Booking::from(record);
                let local = updated.clone();
                attempt
                    .commit(
                        move |events| replace_by_id(events, id, local),
                        Some(Notice::success(kind.success_message())),
                    )
                    .await;
                Ok(updated)
            }
            Err(e) => Err(attempt.roll_back(DeskError::Remote(e)).await),
        }
    }

    /// Cancel a booking. Tentative entries are just dropped.
    pub async fn delete(&self, id: BookingId) -> Result<(), DeskError> {
        let kind = MutationKind::Delete;
        let Some(remote_id) = id.remote() else {
            return if self.abandon(id).await {
                Ok(())
            } else {
                Err(self.reject(kind, DeskError::BookingNotFound(id)))
            };
        };
        self.authorize(kind, &id).await?;

        let mut attempt = Attempt::start(self, kind, id, |events| events.retain(|b| b.id != id)).await;

        match attempt.remote("delete_booking", self.backend.delete_booking(remote_id)).await {
            Ok(()) => {
                attempt
                    .commit(|_| {}, Some(Notice::success(kind.success_message())))
                    .await;
                Ok(())
            }
            Err(e) => Err(attempt.roll_back(DeskError::Remote(e)).await),
        }
    }

    /// The booking behind `id`, if the session may change it.
    async fn authorize(&self, kind: MutationKind, id: &BookingId) -> Result<Booking, DeskError> {
        let Some(booking) = self.find(id).await else {
            return Err(self.reject(kind, DeskError::BookingNotFound(*id)));
        };
        let Some(user_id) = self.session.user_id() else {
            return Err(self.reject(kind, DeskError::Unauthorized(SIGN_IN_REQUIRED)));
        };
        // Tentative entries only exist in this session's view.
        if booking.id.is_tentative() || booking.is_owned_by(user_id) {
            return Ok(booking);
        }
        let msg = if kind == MutationKind::Delete {
            NOT_YOUR_BOOKING_DELETE
        } else {
            NOT_YOUR_BOOKING
        };
        Err(self.reject(kind, DeskError::Unauthorized(msg)))
    }
}
