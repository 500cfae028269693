//! Local view of one studio's bookings and the optimistic mutations on it.
//!
//! Every change is applied to the local event list first, then written to
//! the backend; a failed write restores the target's pre-mutation entry.

mod availability;
mod conflict;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{free_spans, merge_overlapping, subtract_intervals};
pub use conflict::{find_conflict, has_conflict, validate_span};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, BookingBackend};
use crate::error::DeskError;
use crate::model::*;
use crate::notify::{Notice, NotifyHub};
use crate::observability::{
    kind_label, outcome_label, CONFLICTS_TOTAL, MUTATIONS_TOTAL, REMOTE_CALL_DURATION_SECONDS,
};

pub type SharedBackend = Arc<dyn BookingBackend>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Move,
    Resize,
    EditFields,
    Delete,
}

impl MutationKind {
    fn failure_prefix(&self) -> &'static str {
        match self {
            MutationKind::Create => "Failed to create booking",
            MutationKind::Move | MutationKind::Resize => "Failed to update booking",
            MutationKind::EditFields => "Failed to update booking details",
            MutationKind::Delete => "Failed to delete booking",
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            MutationKind::Create => "Your booking has been confirmed",
            MutationKind::Move => "The booking has been successfully rescheduled",
            MutationKind::Resize => "The booking duration has been successfully updated",
            MutationKind::EditFields => "Booking details updated successfully",
            MutationKind::Delete => "Your booking has been cancelled",
        }
    }
}

/// Where a single mutation attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PendingLocalApply,
    AwaitingRemote,
    Committed,
    RolledBack,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Committed | Phase::RolledBack)
    }

    pub fn can_advance_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (*self, next),
            (Idle, PendingLocalApply)
                | (PendingLocalApply, AwaitingRemote)
                // tentative entries change locally only
                | (PendingLocalApply, Committed)
                | (PendingLocalApply, RolledBack)
                | (AwaitingRemote, Committed)
                | (AwaitingRemote, RolledBack)
        )
    }
}

pub struct Calendar {
    studio: Studio,
    session: Session,
    backend: SharedBackend,
    notify: Arc<NotifyHub>,
    hours: Option<OperatingHours>,
    /// Sorted by `span.start`. Never held across a backend call.
    events: RwLock<Vec<Booking>>,
}

fn sort_events(events: &mut [Booking]) {
    events.sort_by_key(|b| b.span.start);
}

fn notice_for(kind: MutationKind, err: &DeskError) -> Notice {
    match err {
        DeskError::Remote(e) => Notice::error("Error", format!("{}: {e}", kind.failure_prefix())),
        other => Notice::error(other.notice_title(), other.to_string()),
    }
}

impl Calendar {
    /// Load a studio and its bookings.
    pub async fn open(
        backend: SharedBackend,
        session: Session,
        studio_id: StudioId,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, DeskError> {
        let loaded = async {
            let studio = backend
                .get_studio(studio_id)
                .await?
                .ok_or(DeskError::StudioNotFound(studio_id))?;
            let records = backend.list_bookings(studio_id, None).await?;
            Ok::<_, DeskError>((studio, records))
        }
        .await;

        let (studio, records) = match loaded {
            Ok(v) => v,
            Err(e) => {
                notify.send(Notice::error("Error", format!("Failed to load studio data: {e}")));
                return Err(e);
            }
        };

        let mut events: Vec<Booking> = records.into_iter().map(Booking::from).collect();
        sort_events(&mut events);
        debug!("opened studio {} with {} bookings", studio.id, events.len());

        Ok(Self {
            studio,
            session,
            backend,
            notify,
            hours: None,
            events: RwLock::new(events),
        })
    }

    /// Restrict new selections to one day's opening window.
    pub fn with_operating_hours(mut self, hours: OperatingHours) -> Self {
        self.hours = Some(hours);
        self
    }

    /// Refuse a mutation before anything local changes.
    fn reject(&self, kind: MutationKind, err: DeskError) -> DeskError {
        if matches!(err, DeskError::Conflict { .. }) {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
        }
        metrics::counter!(MUTATIONS_TOTAL, "kind" => kind_label(kind), "outcome" => "rejected")
            .increment(1);
        debug!("{} rejected on studio {}: {err}", kind_label(kind), self.studio.id);
        self.notify.send(notice_for(kind, &err));
        err
    }
}

/// One mutation attempt: the pre-mutation snapshot plus the phase it is in.
pub(super) struct Attempt<'a> {
    calendar: &'a Calendar,
    kind: MutationKind,
    target: BookingId,
    phase: Phase,
    snapshot: Arc<[Booking]>,
}

impl<'a> Attempt<'a> {
    /// Snapshot the event list and apply `change` to it under one lock.
    pub(super) async fn start(
        calendar: &'a Calendar,
        kind: MutationKind,
        target: BookingId,
        change: impl FnOnce(&mut Vec<Booking>),
    ) -> Attempt<'a> {
        let mut events = calendar.events.write().await;
        let snapshot: Arc<[Booking]> = Arc::from(events.as_slice());
        change(&mut events);
        sort_events(&mut events);
        drop(events);

        let mut attempt = Attempt {
            calendar,
            kind,
            target,
            phase: Phase::Idle,
            snapshot,
        };
        attempt.advance(Phase::PendingLocalApply);
        attempt
    }

    pub(super) fn snapshot(&self) -> &[Booking] {
        &self.snapshot
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        debug!(
            "{} {}: {:?} -> {next:?}",
            kind_label(self.kind),
            self.target,
            self.phase
        );
        self.phase = next;
    }

    /// Issue the backend write. The event list is not locked meanwhile.
    pub(super) async fn remote<T>(
        &mut self,
        op: &'static str,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        self.advance(Phase::AwaitingRemote);
        let started = std::time::Instant::now();
        let result = call.await;
        metrics::histogram!(REMOTE_CALL_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());
        result
    }

    pub(super) async fn commit(mut self, reconcile: impl FnOnce(&mut Vec<Booking>), notice: Option<Notice>) {
        {
            let mut events = self.calendar.events.write().await;
            reconcile(&mut events);
            sort_events(&mut events);
        }
        self.advance(Phase::Committed);
        self.finish();
        info!(
            "{} {} committed on studio {}",
            kind_label(self.kind),
            self.target,
            self.calendar.studio.id
        );
        if let Some(notice) = notice {
            self.calendar.notify.send(notice);
        }
    }

    /// Restore the target's snapshot entry and surface `err`. Other entries
    /// are left alone, so work committed by concurrent attempts survives.
    /// A create drops its tentative entry instead of restoring it.
    pub(super) async fn roll_back(mut self, err: DeskError) -> DeskError {
        {
            let mut events = self.calendar.events.write().await;
            events.retain(|b| b.id != self.target);
            if self.kind != MutationKind::Create
                && let Some(before) = self.snapshot.iter().find(|b| b.id == self.target)
            {
                events.push(before.clone());
            }
            sort_events(&mut events);
        }

        if matches!(err, DeskError::Conflict { .. }) {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
        }
        self.advance(Phase::RolledBack);
        self.finish();
        warn!(
            "{} {} rolled back on studio {}: {err}",
            kind_label(self.kind),
            self.target,
            self.calendar.studio.id
        );
        self.calendar.notify.send(notice_for(self.kind, &err));
        err
    }

    fn finish(&self) {
        debug_assert!(self.phase.is_terminal());
        metrics::counter!(
            MUTATIONS_TOTAL,
            "kind" => kind_label(self.kind),
            "outcome" => outcome_label(self.phase)
        )
        .increment(1);
    }
}
