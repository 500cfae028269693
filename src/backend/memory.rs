use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use super::{BackendError, BookingBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Reject booking writes that overlap another booking of the same studio.
    pub enforce_no_overlap: bool,
    /// Rewrite the WAL after this many appends.
    pub compact_threshold: u64,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            enforce_no_overlap: true,
            compact_threshold: 1000,
        }
    }
}

struct Store {
    studios: DashMap<StudioId, Studio>,
    bookings: DashMap<Ulid, BookingRecord>,
    /// Every write goes through this lock; it owns the log when durable.
    writer: Mutex<Option<Wal>>,
    options: BackendOptions,
}

impl Store {
    fn new(wal: Option<Wal>, options: BackendOptions) -> Self {
        Self {
            studios: DashMap::new(),
            bookings: DashMap::new(),
            writer: Mutex::new(wal),
            options,
        }
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::StudioCreated { studio } | Event::StudioUpdated { studio } => {
                self.studios.insert(studio.id, studio.clone());
            }
            Event::StudioDeleted { id } => {
                self.studios.remove(id);
                self.bookings.retain(|_, b| b.studio_id != *id);
            }
            Event::BookingInserted { record } | Event::BookingUpdated { record } => {
                self.bookings.insert(record.id, record.clone());
            }
            Event::BookingDeleted { id, .. } => {
                self.bookings.remove(id);
            }
        }
    }

    /// Log (when durable) then apply. Caller holds the writer lock.
    fn commit(&self, wal: &mut Option<Wal>, event: Event) -> Result<(), BackendError> {
        if let Some(wal) = wal.as_mut() {
            let flush_start = std::time::Instant::now();
            wal.append(&event)
                .map_err(|e| BackendError::Storage(e.to_string()))?;
            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                .record(flush_start.elapsed().as_secs_f64());
        }
        self.apply(&event);

        if let Some(wal) = wal.as_mut()
            && wal.appends_since_compact() >= self.options.compact_threshold
        {
            let events = self.snapshot_events();
            match wal.compact(&events) {
                Ok(()) => info!("compacted {} to {} events", wal.path().display(), events.len()),
                // The write itself is durable; a failed compaction only costs space.
                Err(e) => warn!("WAL compaction failed: {e}"),
            }
        }
        Ok(())
    }

    /// Minimal event list that recreates the current state.
    fn snapshot_events(&self) -> Vec<Event> {
        let mut studios: Vec<Studio> = self.studios.iter().map(|e| e.value().clone()).collect();
        studios.sort_by_key(|s| s.id);
        let mut bookings: Vec<BookingRecord> =
            self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| (b.span.start, b.id));

        let mut events: Vec<Event> = studios
            .into_iter()
            .map(|studio| Event::StudioCreated { studio })
            .collect();
        events.extend(bookings.into_iter().map(|record| Event::BookingInserted { record }));
        events
    }

    fn first_overlap(&self, studio_id: StudioId, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
        self.bookings
            .iter()
            .find(|e| {
                let b = e.value();
                b.studio_id == studio_id && Some(b.id) != exclude && b.span.overlaps(span)
            })
            .map(|e| *e.key())
    }
}

/// In-process backend. Cloning yields another handle onto the same store;
/// each handle carries the identity it acts as.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<Store>,
    user: Option<User>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Volatile store with default options.
    pub fn new() -> Self {
        Self::with_options(BackendOptions::default())
    }

    pub fn with_options(options: BackendOptions) -> Self {
        Self {
            store: Arc::new(Store::new(None, options)),
            user: None,
        }
    }

    /// Durable store: replay the WAL at `path`, then log every write to it.
    pub fn open(path: &Path, options: BackendOptions) -> io::Result<Self> {
        let replay = Wal::replay(path)?;
        if replay.discarded_tail {
            warn!("{}: discarded a torn or corrupt tail", path.display());
        }
        let wal = Wal::open(path)?;
        let store = Store::new(Some(wal), options);
        for event in &replay.events {
            store.apply(event);
        }
        info!(
            "replayed {} events from {} ({} studios, {} bookings)",
            replay.events.len(),
            path.display(),
            store.studios.len(),
            store.bookings.len()
        );
        Ok(Self {
            store: Arc::new(store),
            user: None,
        })
    }

    /// A handle acting as `user` over the same store.
    pub fn signed_in(&self, user: User) -> Self {
        Self {
            store: self.store.clone(),
            user: Some(user),
        }
    }

    pub fn anonymous(&self) -> Self {
        Self {
            store: self.store.clone(),
            user: None,
        }
    }

    pub fn booking_count(&self) -> usize {
        self.store.bookings.len()
    }

    pub fn studio_count(&self) -> usize {
        self.store.studios.len()
    }

    fn require_user(&self) -> Result<User, BackendError> {
        self.user
            .ok_or_else(|| BackendError::Forbidden("User not authenticated".into()))
    }

    fn require_admin(&self) -> Result<(), BackendError> {
        match self.user {
            Some(User { role: Role::Admin, .. }) => Ok(()),
            _ => Err(BackendError::Forbidden("admin privileges required".into())),
        }
    }
}

fn check_booking_span(span: &Span) -> Result<(), BackendError> {
    if span.start >= span.end {
        return Err(BackendError::Invalid("booking must end after it starts".into()));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BackendError::Invalid("timestamp out of range".into()));
    }
    Ok(())
}

fn check_studio_draft(draft: &StudioDraft) -> Result<(), BackendError> {
    if draft.name.trim().is_empty() {
        return Err(BackendError::Invalid("studio name is required".into()));
    }
    if draft.capacity == 0 {
        return Err(BackendError::Invalid("capacity must be positive".into()));
    }
    Ok(())
}

#[async_trait]
impl BookingBackend for MemoryBackend {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        Ok(self.user)
    }

    async fn list_bookings(
        &self,
        studio_id: StudioId,
        window: Option<Span>,
    ) -> Result<Vec<BookingRecord>, BackendError> {
        let mut out: Vec<BookingRecord> = self
            .store
            .bookings
            .iter()
            .filter(|e| {
                let b = e.value();
                b.studio_id == studio_id && window.is_none_or(|w| w.overlaps(&b.span))
            })
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| (b.span.start, b.id));
        Ok(out)
    }

    async fn list_bookings_by_owner(&self, owner_id: UserId) -> Result<Vec<BookingRecord>, BackendError> {
        let mut out: Vec<BookingRecord> = self
            .store
            .bookings
            .iter()
            .filter(|e| e.value().owner_id == owner_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| (b.span.start, b.id));
        Ok(out)
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<BookingRecord, BackendError> {
        let user = self.require_user()?;
        if user.id != booking.owner_id {
            return Err(BackendError::Forbidden(
                "cannot create a booking for another user".into(),
            ));
        }
        check_booking_span(&booking.span)?;

        let mut wal = self.store.writer.lock().await;
        if !self.store.studios.contains_key(&booking.studio_id) {
            return Err(BackendError::NotFound(booking.studio_id));
        }
        let per_studio = self
            .store
            .bookings
            .iter()
            .filter(|e| e.value().studio_id == booking.studio_id)
            .count();
        if per_studio >= MAX_BOOKINGS_PER_STUDIO {
            return Err(BackendError::Constraint("too many bookings for studio".into()));
        }
        if self.store.options.enforce_no_overlap
            && let Some(other) = self.store.first_overlap(booking.studio_id, &booking.span, None)
        {
            return Err(BackendError::Constraint(format!(
                "booking overlaps existing booking {other}"
            )));
        }

        let record = BookingRecord {
            id: Ulid::new(),
            studio_id: booking.studio_id,
            owner_id: booking.owner_id,
            span: booking.span,
            title: booking.title,
            description: booking.description,
        };
        self.store.commit(&mut wal, Event::BookingInserted { record: record.clone() })?;
        debug!("inserted booking {} on studio {}", record.id, record.studio_id);
        Ok(record)
    }

    async fn update_booking(&self, id: Ulid, patch: BookingPatch) -> Result<BookingRecord, BackendError> {
        self.require_user()?;
        let mut wal = self.store.writer.lock().await;
        let mut record = self
            .store
            .bookings
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(BackendError::NotFound(id))?;
        patch.apply_to(&mut record);
        check_booking_span(&record.span)?;

        if self.store.options.enforce_no_overlap
            && patch.span.is_some()
            && let Some(other) = self.store.first_overlap(record.studio_id, &record.span, Some(id))
        {
            return Err(BackendError::Constraint(format!(
                "booking overlaps existing booking {other}"
            )));
        }

        self.store.commit(&mut wal, Event::BookingUpdated { record: record.clone() })?;
        debug!("updated booking {id}");
        Ok(record)
    }

    async fn delete_booking(&self, id: Ulid) -> Result<(), BackendError> {
        self.require_user()?;
        let mut wal = self.store.writer.lock().await;
        let studio_id = self
            .store
            .bookings
            .get(&id)
            .map(|e| e.value().studio_id)
            .ok_or(BackendError::NotFound(id))?;
        self.store.commit(&mut wal, Event::BookingDeleted { id, studio_id })?;
        debug!("deleted booking {id}");
        Ok(())
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, BackendError> {
        let mut out: Vec<Studio> = self.store.studios.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_studio(&self, id: StudioId) -> Result<Option<Studio>, BackendError> {
        Ok(self.store.studios.get(&id).map(|e| e.value().clone()))
    }

    async fn insert_studio(&self, draft: StudioDraft) -> Result<Studio, BackendError> {
        self.require_admin()?;
        check_studio_draft(&draft)?;
        let mut wal = self.store.writer.lock().await;
        let studio = Studio::from_draft(Ulid::new(), draft);
        self.store.commit(&mut wal, Event::StudioCreated { studio: studio.clone() })?;
        info!("created studio {} ({})", studio.id, studio.name);
        Ok(studio)
    }

    async fn update_studio(&self, id: StudioId, draft: StudioDraft) -> Result<Studio, BackendError> {
        self.require_admin()?;
        check_studio_draft(&draft)?;
        let mut wal = self.store.writer.lock().await;
        if !self.store.studios.contains_key(&id) {
            return Err(BackendError::NotFound(id));
        }
        let studio = Studio::from_draft(id, draft);
        self.store.commit(&mut wal, Event::StudioUpdated { studio: studio.clone() })?;
        Ok(studio)
    }

    async fn delete_studio(&self, id: StudioId) -> Result<(), BackendError> {
        self.require_admin()?;
        let mut wal = self.store.writer.lock().await;
        if !self.store.studios.contains_key(&id) {
            return Err(BackendError::NotFound(id));
        }
        self.store.commit(&mut wal, Event::StudioDeleted { id })?;
        info!("deleted studio {id}");
        Ok(())
    }
}
