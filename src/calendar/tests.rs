use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use super::*;
use crate::backend::{BackendOptions, MemoryBackend};
use crate::notify::Level;

const T0: Ms = 1_767_225_600_000; // 2026-01-01T00:00:00Z
const M: Ms = 60_000;

fn h(hour: Ms) -> Ms {
    T0 + hour * HOUR_MS
}

fn hm(hour: Ms, minute: Ms) -> Ms {
    h(hour) + minute * M
}

fn span_h(start: Ms, end: Ms) -> Span {
    Span::new(h(start), h(end))
}

fn booking(start: Ms, end: Ms) -> Booking {
    Booking {
        id: BookingId::Confirmed(Ulid::new()),
        studio_id: Ulid::new(),
        owner_id: Some(Ulid::new()),
        span: Span::new(start, end),
        title: None,
        description: None,
    }
}

/// Delegates to a `MemoryBackend`, counts writes, and fails them on demand.
struct FlakyBackend {
    inner: MemoryBackend,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    hold_updates: AtomicBool,
    update_gate: Notify,
}

impl FlakyBackend {
    fn new(inner: MemoryBackend) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            hold_updates: AtomicBool::new(false),
            update_gate: Notify::new(),
        })
    }

    fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Park every `update_booking` until [`FlakyBackend::release_update`].
    fn hold_updates(&self, on: bool) {
        self.hold_updates.store(on, Ordering::SeqCst);
    }

    fn release_update(&self) {
        self.update_gate.notify_one();
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write_gate(&self) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("network error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingBackend for FlakyBackend {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        self.inner.current_user().await
    }

    async fn list_bookings(
        &self,
        studio_id: StudioId,
        window: Option<Span>,
    ) -> Result<Vec<BookingRecord>, BackendError> {
        self.inner.list_bookings(studio_id, window).await
    }

    async fn list_bookings_by_owner(&self, owner_id: UserId) -> Result<Vec<BookingRecord>, BackendError> {
        self.inner.list_bookings_by_owner(owner_id).await
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<BookingRecord, BackendError> {
        self.write_gate()?;
        self.inner.insert_booking(booking).await
    }

    async fn update_booking(&self, id: Ulid, patch: BookingPatch) -> Result<BookingRecord, BackendError> {
        if self.hold_updates.load(Ordering::SeqCst) {
            self.update_gate.notified().await;
        }
        self.write_gate()?;
        self.inner.update_booking(id, patch).await
    }

    async fn delete_booking(&self, id: Ulid) -> Result<(), BackendError> {
        self.write_gate()?;
        self.inner.delete_booking(id).await
    }

    async fn list_studios(&self) -> Result<Vec<Studio>, BackendError> {
        self.inner.list_studios().await
    }

    async fn get_studio(&self, id: StudioId) -> Result<Option<Studio>, BackendError> {
        self.inner.get_studio(id).await
    }

    async fn insert_studio(&self, draft: StudioDraft) -> Result<Studio, BackendError> {
        self.write_gate()?;
        self.inner.insert_studio(draft).await
    }

    async fn update_studio(&self, id: StudioId, draft: StudioDraft) -> Result<Studio, BackendError> {
        self.write_gate()?;
        self.inner.update_studio(id, draft).await
    }

    async fn delete_studio(&self, id: StudioId) -> Result<(), BackendError> {
        self.write_gate()?;
        self.inner.delete_studio(id).await
    }
}

struct Fixture {
    root: MemoryBackend,
    studio: Studio,
    alice: User,
    bob: User,
}

async fn fixture_with(options: BackendOptions) -> Fixture {
    let root = MemoryBackend::with_options(options);
    let studio = root
        .signed_in(User::admin(Ulid::new()))
        .insert_studio(StudioDraft {
            name: "Studio A".into(),
            description: "Daylight photo studio".into(),
            image_url: "https://img.example/a.jpg".into(),
            price_per_hour: 40,
            capacity: 10,
            location: "Friedrichshain".into(),
            category: StudioCategory::Photography,
        })
        .await
        .unwrap();
    Fixture {
        root,
        studio,
        alice: User::member(Ulid::new()),
        bob: User::member(Ulid::new()),
    }
}

async fn fixture() -> Fixture {
    fixture_with(BackendOptions::default()).await
}

impl Fixture {
    /// Store a booking directly, bypassing any calendar.
    async fn seed(&self, owner: User, span: Span) -> BookingId {
        let rec = self
            .root
            .signed_in(owner)
            .insert_booking(NewBooking {
                studio_id: self.studio.id,
                owner_id: owner.id,
                span,
                title: Some("Seeded".into()),
                description: None,
            })
            .await
            .unwrap();
        BookingId::Confirmed(rec.id)
    }

    async fn open(&self, user: Option<User>) -> (Calendar, Arc<FlakyBackend>, broadcast::Receiver<Notice>) {
        let client = match user {
            Some(u) => self.root.signed_in(u),
            None => self.root.anonymous(),
        };
        let flaky = FlakyBackend::new(client);
        let backend: SharedBackend = flaky.clone();
        let session = Session::resolve(backend.as_ref()).await.unwrap();
        let notify = Arc::new(NotifyHub::default());
        let rx = notify.subscribe();
        let calendar = Calendar::open(backend, session, self.studio.id, notify).await.unwrap();
        (calendar, flaky, rx)
    }
}

fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

/// (id, start, end, title, description) per entry, for element-wise comparison.
fn shape(events: &[Booking]) -> Vec<(BookingId, Ms, Ms, Option<String>, Option<String>)> {
    events
        .iter()
        .map(|b| (b.id, b.span.start, b.span.end, b.title.clone(), b.description.clone()))
        .collect()
}

// ── Conflict checker ─────────────────────────────────────

#[test]
fn overlapping_candidate_conflicts() {
    let existing = vec![booking(h(10), h(12))];
    assert!(has_conflict(&span_h(11, 13), &existing, None));
}

#[test]
fn back_to_back_candidate_is_free() {
    let existing = vec![booking(h(10), h(12))];
    assert!(!has_conflict(&span_h(12, 13), &existing, None));
    assert!(!has_conflict(&span_h(9, 10), &existing, None));
}

#[test]
fn conflict_is_symmetric() {
    let points = [0, 1, 2, 3, 4, 5];
    for &a0 in &points {
        for &a1 in points.iter().filter(|&&p| p >= a0) {
            for &b0 in &points {
                for &b1 in points.iter().filter(|&&p| p >= b0) {
                    let a = booking(h(a0), h(a1));
                    let b = booking(h(b0), h(b1));
                    assert_eq!(
                        has_conflict(&a.span, std::slice::from_ref(&b), None),
                        has_conflict(&b.span, std::slice::from_ref(&a), None),
                        "asymmetric for {:?} vs {:?}",
                        a.span,
                        b.span
                    );
                }
            }
        }
    }
}

#[test]
fn zero_length_candidate_never_conflicts() {
    let existing = vec![booking(h(10), h(12)), booking(h(11), h(11))];
    for t in [h(9), h(10), h(11), h(12)] {
        assert!(!has_conflict(&Span::new(t, t), &existing, None));
    }
    // not even with an identical zero-length booking
    let z = booking(h(11), h(11));
    assert!(!has_conflict(&z.span, std::slice::from_ref(&z), None));
}

#[test]
fn excluded_booking_never_self_conflicts() {
    let me = booking(h(9), h(10));
    let other = booking(h(12), h(13));
    let existing = vec![me.clone(), other.clone()];

    assert!(!has_conflict(&span_h(9, 11), &existing, Some(&me.id)));
    assert!(has_conflict(&span_h(9, 11), &existing, None));
    assert!(has_conflict(&span_h(9, 13), &existing, Some(&me.id)));
    assert!(has_conflict(&span_h(12, 13), &existing, Some(&me.id)));
}

#[test]
fn empty_snapshot_never_conflicts() {
    assert!(!has_conflict(&span_h(0, 24), &[], None));
}

#[test]
fn find_conflict_returns_first_hit() {
    let a = booking(h(9), h(11));
    let b = booking(h(10), h(12));
    let existing = vec![a.clone(), b];
    assert_eq!(find_conflict(&span_h(10, 11), &existing, None).map(|x| x.id), Some(a.id));
}

#[test]
fn validate_span_rules() {
    assert_ok!(validate_span(&span_h(9, 10)));
    assert_eq!(validate_span(&span_h(9, 9)), Err(DeskError::InvalidSpan(span_h(9, 9))));
    assert_eq!(validate_span(&span_h(10, 9)), Err(DeskError::InvalidSpan(span_h(10, 9))));
    assert!(!has_conflict(&span_h(10, 9), &[booking(h(9), h(11))], None));
    assert!(matches!(
        validate_span(&Span::new(0, HOUR_MS)),
        Err(DeskError::LimitExceeded(_))
    ));
    assert!(matches!(
        validate_span(&span_h(0, 24 * 8)),
        Err(DeskError::LimitExceeded(_))
    ));
}

#[test]
fn phase_transitions() {
    assert!(Phase::Idle.can_advance_to(Phase::PendingLocalApply));
    assert!(Phase::PendingLocalApply.can_advance_to(Phase::AwaitingRemote));
    assert!(Phase::AwaitingRemote.can_advance_to(Phase::RolledBack));
    assert!(!Phase::Idle.can_advance_to(Phase::AwaitingRemote));
    assert!(!Phase::Committed.can_advance_to(Phase::RolledBack));
    assert!(!Phase::RolledBack.can_advance_to(Phase::Idle));
    assert!(Phase::Committed.is_terminal() && Phase::RolledBack.is_terminal());
}

// ── Opening ──────────────────────────────────────────────

#[tokio::test]
async fn open_missing_studio() {
    let fx = fixture().await;
    let backend: SharedBackend = Arc::new(fx.root.signed_in(fx.alice));
    let notify = Arc::new(NotifyHub::default());
    let mut rx = notify.subscribe();
    let missing = Ulid::new();

    let result = Calendar::open(backend, Session::signed_in(fx.alice), missing, notify).await;
    assert_eq!(result.err(), Some(DeskError::StudioNotFound(missing)));
    assert_eq!(drain(&mut rx)[0].title, "Error");
}

#[tokio::test]
async fn open_loads_bookings_in_order() {
    let fx = fixture().await;
    fx.seed(fx.bob, span_h(14, 15)).await;
    fx.seed(fx.bob, span_h(9, 10)).await;

    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let events = cal.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].span, span_h(9, 10));
    assert!(events.iter().all(|b| !b.id.is_tentative()));
}

// ── Create ───────────────────────────────────────────────

#[tokio::test]
async fn select_adds_tentative_entry_only_locally() {
    let fx = fixture().await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;

    let id = cal.select(span_h(9, 10)).await.unwrap();
    assert!(id.is_tentative());
    let events = cal.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].owner_id, None);
    assert_eq!(backend.writes(), 0);
    assert_eq!(fx.root.booking_count(), 0);
}

#[tokio::test]
async fn select_over_existing_booking_is_refused() {
    let fx = fixture().await;
    let existing = fx.seed(fx.bob, span_h(10, 12)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;

    let err = cal.select(span_h(11, 13)).await.unwrap_err();
    assert_eq!(err, DeskError::Conflict { with: existing });
    assert_eq!(cal.events().await.len(), 1);
    assert_eq!(backend.writes(), 0);

    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Booking Conflict");
    assert_eq!(notices[0].level, Level::Error);
}

#[tokio::test]
async fn select_requires_sign_in() {
    let fx = fixture().await;
    let (cal, _, mut rx) = fx.open(None).await;
    let err = cal.select(span_h(9, 10)).await.unwrap_err();
    assert!(matches!(err, DeskError::Unauthorized(_)));
    assert!(cal.events().await.is_empty());
    assert_eq!(drain(&mut rx)[0].title, "Access Denied");
}

#[tokio::test]
async fn select_outside_opening_hours() {
    let fx = fixture().await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let cal = cal.with_operating_hours(OperatingHours::default());

    assert!(matches!(
        cal.select(span_h(7, 9)).await,
        Err(DeskError::OutsideOperatingHours(_))
    ));
    assert_ok!(cal.select(span_h(8, 9)).await);
}

#[tokio::test]
async fn confirm_promotes_tentative_entry() {
    let fx = fixture().await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;

    let tentative = cal.select(span_h(9, 10)).await.unwrap();
    let confirmed = cal
        .confirm(tentative, Some("Product shoot".into()), Some("bring the cyclorama".into()))
        .await
        .unwrap();

    assert!(!confirmed.id.is_tentative());
    assert_eq!(confirmed.owner_id, Some(fx.alice.id));
    assert_eq!(confirmed.title.as_deref(), Some("Product shoot"));
    assert_eq!(backend.writes(), 1);

    let events = cal.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, confirmed.id);

    let stored = fx.root.list_bookings(fx.studio.id, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(BookingId::Confirmed(stored[0].id), confirmed.id);

    let notices = drain(&mut rx);
    assert_eq!(notices, vec![Notice::success("Your booking has been confirmed")]);
}

#[tokio::test]
async fn failed_create_removes_tentative_entry() {
    let fx = fixture().await;
    fx.seed(fx.bob, span_h(14, 15)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;
    let before = shape(&cal.events().await);

    backend.fail_writes(true);
    let tentative = cal.select(span_h(9, 10)).await.unwrap();
    let err = cal.confirm(tentative, None, None).await.unwrap_err();

    assert!(matches!(err, DeskError::Remote(BackendError::Unavailable(_))));
    assert_eq!(shape(&cal.events().await), before);
    assert_eq!(fx.root.booking_count(), 1);

    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, Level::Error);
    assert!(notices[0].description.starts_with("Failed to create booking: "));
    assert!(notices[0].description.contains("network error"));
}

#[tokio::test]
async fn confirm_rejects_confirmed_ids() {
    let fx = fixture().await;
    let existing = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;

    assert_eq!(
        cal.confirm(existing, None, None).await.unwrap_err(),
        DeskError::AlreadyConfirmed(existing)
    );
    assert_eq!(backend.writes(), 0);
}

#[tokio::test]
async fn confirm_unknown_tentative() {
    let fx = fixture().await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let ghost = BookingId::new_tentative();
    assert_eq!(
        cal.confirm(ghost, None, None).await.unwrap_err(),
        DeskError::BookingNotFound(ghost)
    );
}

#[tokio::test]
async fn abandon_drops_tentative_without_remote_call() {
    let fx = fixture().await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;

    let id = cal.select(span_h(9, 10)).await.unwrap();
    assert!(cal.abandon(id).await);
    assert!(!cal.abandon(id).await);
    assert!(cal.events().await.is_empty());
    assert_eq!(backend.writes(), 0);
}

#[tokio::test]
async fn book_selects_and_confirms() {
    let fx = fixture().await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let b = cal.book(span_h(9, 11), None, None).await.unwrap();
    assert_eq!(b.display_title(), DEFAULT_BOOKING_TITLE);
    assert_eq!(cal.quote(&b.span), 80);
    assert_eq!(fx.root.booking_count(), 1);
}

// ── Move / resize ────────────────────────────────────────

#[tokio::test]
async fn moving_someone_elses_booking_is_denied() {
    let fx = fixture().await;
    let bobs = fx.seed(fx.bob, span_h(9, 10)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;
    let before = shape(&cal.events().await);

    let err = cal.move_booking(bobs, span_h(13, 14)).await.unwrap_err();
    assert_eq!(err, DeskError::Unauthorized("You can only modify your own bookings"));
    assert_eq!(backend.writes(), 0);
    assert_eq!(shape(&cal.events().await), before);

    let notices = drain(&mut rx);
    assert_eq!(notices[0].title, "Access Denied");
}

#[tokio::test]
async fn move_own_booking() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;

    let moved = cal.move_booking(mine, span_h(13, 14)).await.unwrap();
    assert_eq!(moved.span, span_h(13, 14));
    assert_eq!(moved.id, mine);
    assert_eq!(backend.writes(), 1);
    assert_eq!(cal.view(mine).await.unwrap().span, span_h(13, 14));

    let stored = fx.root.list_bookings(fx.studio.id, None).await.unwrap();
    assert_eq!(stored[0].span, span_h(13, 14));
    assert_eq!(
        drain(&mut rx),
        vec![Notice::success("The booking has been successfully rescheduled")]
    );
}

#[tokio::test]
async fn resize_into_occupied_time_is_reverted_locally() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let theirs = fx.seed(fx.bob, span_h(10, 11)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;
    let before = shape(&cal.events().await);

    let err = cal.resize(mine, Span::new(h(9), hm(11, 30))).await.unwrap_err();
    assert_eq!(err, DeskError::Conflict { with: theirs });
    assert_eq!(backend.writes(), 0);
    assert_eq!(shape(&cal.events().await), before);
    assert_eq!(drain(&mut rx)[0].title, "Booking Conflict");
}

#[tokio::test]
async fn failed_move_restores_previous_list() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    fx.seed(fx.bob, span_h(12, 13)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;
    let before = shape(&cal.events().await);

    backend.fail_writes(true);
    let err = cal.move_booking(mine, span_h(15, 16)).await.unwrap_err();
    assert!(matches!(err, DeskError::Remote(_)));
    assert_eq!(backend.writes(), 1);
    assert_eq!(shape(&cal.events().await), before);

    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].description.starts_with("Failed to update booking: "));

    let stored = fx.root.list_bookings(fx.studio.id, None).await.unwrap();
    assert_eq!(stored[0].span, span_h(9, 10));
}

#[tokio::test]
async fn resize_does_not_conflict_with_itself() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;

    let grown = cal.resize(mine, span_h(9, 12)).await.unwrap();
    assert_eq!(grown.span, span_h(9, 12));
    let shrunk = cal.resize(mine, Span::new(hm(9, 30), h(12))).await.unwrap();
    assert_eq!(shrunk.span.start, hm(9, 30));
}

#[tokio::test]
async fn moving_tentative_entry_stays_local() {
    let fx = fixture().await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;

    let id = cal.select(span_h(9, 10)).await.unwrap();
    let moved = cal.move_booking(id, span_h(11, 12)).await.unwrap();
    assert_eq!(moved.span, span_h(11, 12));
    assert_eq!(backend.writes(), 0);
    assert!(drain(&mut rx).is_empty());

    let confirmed = cal.confirm(id, None, None).await.unwrap();
    assert_eq!(confirmed.span, span_h(11, 12));
}

#[tokio::test]
async fn move_with_invalid_span_is_rejected() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;
    assert_err!(cal.move_booking(mine, span_h(10, 10)).await);
    assert_eq!(backend.writes(), 0);
}

// ── Edit fields ──────────────────────────────────────────

#[tokio::test]
async fn editing_twice_converges() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;

    let once = cal
        .edit(mine, Some("Podcast".into()), Some("two mics".into()))
        .await
        .unwrap();
    let after_once = shape(&cal.events().await);
    let twice = cal
        .edit(mine, Some("Podcast".into()), Some("two mics".into()))
        .await
        .unwrap();

    assert_eq!(once, twice);
    assert_eq!(shape(&cal.events().await), after_once);
    assert_eq!(cal.events().await.len(), 1);
    assert_eq!(fx.root.booking_count(), 1);
}

#[tokio::test]
async fn edit_keeps_unset_fields() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;

    let edited = cal.edit(mine, None, Some("late start".into())).await.unwrap();
    assert_eq!(edited.title.as_deref(), Some("Seeded"));
    assert_eq!(edited.description.as_deref(), Some("late start"));
}

#[tokio::test]
async fn editing_someone_elses_booking_is_denied() {
    let fx = fixture().await;
    let bobs = fx.seed(fx.bob, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;

    assert!(matches!(
        cal.edit(bobs, Some("mine now".into()), None).await,
        Err(DeskError::Unauthorized(_))
    ));
    assert_eq!(backend.writes(), 0);
    assert_eq!(cal.view(bobs).await.unwrap().title.as_deref(), Some("Seeded"));
}

#[tokio::test]
async fn failed_edit_restores_fields() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, mut rx) = fx.open(Some(fx.alice)).await;
    let before = shape(&cal.events().await);

    backend.fail_writes(true);
    assert_err!(cal.edit(mine, Some("Renamed".into()), None).await);
    assert_eq!(shape(&cal.events().await), before);
    assert!(drain(&mut rx)[0]
        .description
        .starts_with("Failed to update booking details: "));
}

// ── Delete ───────────────────────────────────────────────

#[tokio::test]
async fn delete_own_booking() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, _, mut rx) = fx.open(Some(fx.alice)).await;

    cal.delete(mine).await.unwrap();
    assert!(cal.events().await.is_empty());
    assert_eq!(fx.root.booking_count(), 0);
    assert_eq!(drain(&mut rx), vec![Notice::success("Your booking has been cancelled")]);
}

#[tokio::test]
async fn failed_delete_puts_booking_back() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;
    let before = shape(&cal.events().await);

    backend.fail_writes(true);
    assert_err!(cal.delete(mine).await);
    assert_eq!(shape(&cal.events().await), before);
    assert_eq!(fx.root.booking_count(), 1);
}

#[tokio::test]
async fn deleting_someone_elses_booking_is_denied() {
    let fx = fixture().await;
    let bobs = fx.seed(fx.bob, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;

    assert_eq!(
        cal.delete(bobs).await.unwrap_err(),
        DeskError::Unauthorized("You can only delete your own bookings")
    );
    assert_eq!(backend.writes(), 0);
    assert_eq!(cal.events().await.len(), 1);
}

#[tokio::test]
async fn deleting_tentative_entry_needs_no_backend() {
    let fx = fixture().await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;
    let id = cal.select(span_h(9, 10)).await.unwrap();

    cal.delete(id).await.unwrap();
    assert!(cal.events().await.is_empty());
    assert_eq!(backend.writes(), 0);
    assert_eq!(cal.delete(id).await.unwrap_err(), DeskError::BookingNotFound(id));
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn anyone_can_view_but_only_owner_can_modify() {
    let fx = fixture().await;
    let bobs = fx.seed(fx.bob, span_h(9, 10)).await;
    let (cal, _, mut rx) = fx.open(Some(fx.alice)).await;

    let seen = cal.view(bobs).await.unwrap();
    assert_eq!(seen.owner_id, Some(fx.bob.id));
    assert!(!cal.can_modify(&seen));
    assert!(drain(&mut rx).is_empty());

    let (bob_cal, _, _) = fx.open(Some(fx.bob)).await;
    assert!(bob_cal.can_modify(&seen));

    let (anon_cal, _, _) = fx.open(None).await;
    assert!(!anon_cal.can_modify(&seen));
}

#[tokio::test]
async fn free_slots_skip_bookings() {
    let fx = fixture().await;
    fx.seed(fx.bob, span_h(10, 12)).await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let cal = cal.with_operating_hours(OperatingHours::default());
    cal.select(span_h(15, 16)).await.unwrap();

    let free = cal.free_slots(span_h(0, 24)).await.unwrap();
    assert_eq!(free, vec![span_h(8, 10), span_h(12, 15), span_h(16, 20)]);

    assert!(matches!(
        cal.free_slots(span_h(0, 24 * 400)).await,
        Err(DeskError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn free_slots_rejects_windows_outside_valid_range() {
    let fx = fixture().await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let cal = cal.with_operating_hours(OperatingHours::default());

    for window in [
        Span::new(Ms::MIN, Ms::MAX),
        Span::new(Ms::MIN, h(10)),
        Span::new(h(10), Ms::MAX),
    ] {
        assert!(matches!(
            cal.free_slots(window).await,
            Err(DeskError::LimitExceeded(_))
        ));
    }
    assert!(matches!(
        cal.free_slots(Span::new(Ms::MAX, Ms::MIN)).await,
        Err(DeskError::InvalidSpan(_))
    ));
}

#[tokio::test]
async fn refresh_picks_up_remote_changes_and_keeps_tentative() {
    let fx = fixture().await;
    let (cal, _, _) = fx.open(Some(fx.alice)).await;
    let tentative = cal.select(span_h(9, 10)).await.unwrap();

    fx.seed(fx.bob, span_h(14, 15)).await;
    assert_eq!(cal.events().await.len(), 1);

    cal.refresh().await.unwrap();
    let events = cal.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, tentative);
    assert_eq!(events[1].owner_id, Some(fx.bob.id));
}

// ── Overlapping attempts ─────────────────────────────────

#[tokio::test]
async fn independent_attempts_in_flight_together() {
    let fx = fixture().await;
    let a = fx.seed(fx.alice, span_h(9, 10)).await;
    let b = fx.seed(fx.alice, span_h(11, 12)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;

    let (ra, rb) = tokio::join!(
        cal.move_booking(a, span_h(13, 14)),
        cal.edit(b, Some("Rehearsal".into()), None),
    );
    assert_ok!(ra);
    assert_ok!(rb);
    assert_eq!(backend.writes(), 2);

    let events = cal.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].title.as_deref(), Some("Rehearsal"));
    assert_eq!(events[1].span, span_h(13, 14));
}

#[tokio::test]
async fn failed_move_keeps_booking_committed_while_it_was_in_flight() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;
    backend.hold_updates(true);

    let (moved, booked) = tokio::join!(cal.move_booking(mine, span_h(15, 16)), async {
        let booked = cal.book(span_h(12, 13), None, None).await;
        backend.fail_writes(true);
        backend.release_update();
        booked
    });
    assert!(matches!(moved, Err(DeskError::Remote(_))));
    let booked = booked.unwrap();

    let events = cal.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].id, events[0].span), (mine, span_h(9, 10)));
    assert_eq!((events[1].id, events[1].span), (booked.id, span_h(12, 13)));
    assert_eq!(fx.root.booking_count(), 2);
}

#[tokio::test]
async fn failed_delete_restores_only_its_entry() {
    let fx = fixture().await;
    let mine = fx.seed(fx.alice, span_h(9, 10)).await;
    let (cal, backend, _) = fx.open(Some(fx.alice)).await;
    let other = cal.book(span_h(11, 12), None, None).await.unwrap();
    backend.fail_writes(true);

    assert_err!(cal.delete(mine).await);
    let ids: Vec<BookingId> = cal.events().await.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![mine, other.id]);
}

#[tokio::test]
async fn racing_clients_are_stopped_by_the_store() {
    let fx = fixture().await;
    let (alice_cal, _, _) = fx.open(Some(fx.alice)).await;
    let (bob_cal, _, mut bob_rx) = fx.open(Some(fx.bob)).await;

    // Both see a free slot locally.
    let a = alice_cal.select(span_h(9, 10)).await.unwrap();
    let b = bob_cal.select(span_h(9, 10)).await.unwrap();

    assert_ok!(alice_cal.confirm(a, None, None).await);
    let err = bob_cal.confirm(b, None, None).await.unwrap_err();
    assert!(matches!(err, DeskError::Remote(BackendError::Constraint(_))));
    assert!(bob_cal.events().await.is_empty());
    assert_eq!(fx.root.booking_count(), 1);
    assert_eq!(drain(&mut bob_rx).last().unwrap().level, Level::Error);
}

#[tokio::test]
async fn racing_clients_double_book_without_store_constraint() {
    let fx = fixture_with(BackendOptions {
        enforce_no_overlap: false,
        ..Default::default()
    })
    .await;
    let (alice_cal, _, _) = fx.open(Some(fx.alice)).await;
    let (bob_cal, _, _) = fx.open(Some(fx.bob)).await;

    let a = alice_cal.select(span_h(9, 10)).await.unwrap();
    let b = bob_cal.select(span_h(9, 10)).await.unwrap();
    assert_ok!(alice_cal.confirm(a, None, None).await);
    assert_ok!(bob_cal.confirm(b, None, None).await);
    assert_eq!(fx.root.booking_count(), 2);
}
