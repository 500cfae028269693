use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC.
pub type Ms = i64;

pub type StudioId = Ulid;
pub type UserId = Ulid;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
///
/// Construction never validates: `start == end` spans overlap nothing, and
/// inverted spans are rejected by `validate_span` where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    /// Saturates instead of overflowing on extreme endpoints.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whole hours, rounded half-up. This is what a customer is billed for.
    pub fn billable_hours(&self) -> u64 {
        let d = self.duration_ms().max(0);
        (d.saturating_add(HOUR_MS / 2) / HOUR_MS) as u64
    }
}

/// Identity of a calendar entry. Tentative ids live only in the local view;
/// the backend hands out confirmed ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingId {
    Tentative(Ulid),
    Confirmed(Ulid),
}

impl BookingId {
    pub fn new_tentative() -> Self {
        BookingId::Tentative(Ulid::new())
    }

    pub fn is_tentative(&self) -> bool {
        matches!(self, BookingId::Tentative(_))
    }

    /// The backend id, if this entry has been persisted.
    pub fn remote(&self) -> Option<Ulid> {
        match self {
            BookingId::Confirmed(id) => Some(*id),
            BookingId::Tentative(_) => None,
        }
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingId::Tentative(id) => write!(f, "tentative:{id}"),
            BookingId::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

pub const DEFAULT_BOOKING_TITLE: &str = "Your Booking";

/// A booking as the local calendar sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub studio_id: StudioId,
    /// `None` until the booking is persisted.
    pub owner_id: Option<UserId>,
    pub span: Span,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Booking {
    pub fn tentative(studio_id: StudioId, span: Span) -> Self {
        Self {
            id: BookingId::new_tentative(),
            studio_id,
            owner_id: None,
            span,
            title: None,
            description: None,
        }
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_BOOKING_TITLE,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == Some(user_id)
    }
}

impl From<BookingRecord> for Booking {
    fn from(rec: BookingRecord) -> Self {
        Self {
            id: BookingId::Confirmed(rec.id),
            studio_id: rec.studio_id,
            owner_id: Some(rec.owner_id),
            span: rec.span,
            title: rec.title,
            description: rec.description,
        }
    }
}

// ── Backend rows ─────────────────────────────────────────────────

/// A booking row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub studio_id: StudioId,
    pub owner_id: UserId,
    pub span: Span,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Insert payload for a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub studio_id: StudioId,
    pub owner_id: UserId,
    pub span: Span,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub span: Option<Span>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl BookingPatch {
    pub fn reschedule(span: Span) -> Self {
        Self {
            span: Some(span),
            ..Default::default()
        }
    }

    pub fn details(title: Option<String>, description: Option<String>) -> Self {
        Self {
            span: None,
            title,
            description,
        }
    }

    pub fn apply_to(&self, rec: &mut BookingRecord) {
        if let Some(span) = self.span {
            rec.span = span;
        }
        if let Some(ref title) = self.title {
            rec.title = Some(title.clone());
        }
        if let Some(ref description) = self.description {
            rec.description = Some(description.clone());
        }
    }
}

// ── Studios ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudioCategory {
    Photography,
    Audio,
    Video,
}

impl StudioCategory {
    pub const ALL: [StudioCategory; 3] = [Self::Photography, Self::Audio, Self::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudioCategory::Photography => "photography",
            StudioCategory::Audio => "audio",
            StudioCategory::Video => "video",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StudioCategory::Photography => "Photography",
            StudioCategory::Audio => "Audio Recording",
            StudioCategory::Video => "Video Production",
        }
    }
}

impl fmt::Display for StudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudioCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown studio category: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Studio {
    pub id: StudioId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Whole currency units per hour; zero means free.
    pub price_per_hour: u32,
    pub capacity: u32,
    pub location: String,
    pub category: StudioCategory,
}

impl Studio {
    pub fn from_draft(id: StudioId, draft: StudioDraft) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            image_url: draft.image_url,
            price_per_hour: draft.price_per_hour,
            capacity: draft.capacity,
            location: draft.location,
            category: draft.category,
        }
    }

    pub fn price_label(&self) -> String {
        if self.price_per_hour == 0 {
            "FREE".to_string()
        } else {
            format!("${}/hour", self.price_per_hour)
        }
    }

    /// Price of booking `span`, billed on rounded whole hours.
    pub fn quote(&self, span: &Span) -> u64 {
        span.billable_hours() * u64::from(self.price_per_hour)
    }
}

/// Studio fields without an id, used for inserts and full updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioDraft {
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price_per_hour: u32,
    pub capacity: u32,
    pub location: String,
    pub category: StudioCategory,
}

// ── Identity ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
}

impl User {
    pub fn member(id: UserId) -> Self {
        Self { id, role: Role::User }
    }

    pub fn admin(id: UserId) -> Self {
        Self { id, role: Role::Admin }
    }
}

/// Who is acting. Passed explicitly to every component that needs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.map(|u| u.id)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.user, Some(User { role: Role::Admin, .. }))
    }
}

/// Daily opening window in UTC hours, `[open_hour, close_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingHours {
    pub open_hour: u8,
    pub close_hour: u8,
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self {
            open_hour: 8,
            close_hour: 20,
        }
    }
}

impl OperatingHours {
    fn day_start(t: Ms) -> Ms {
        t.saturating_sub(t.rem_euclid(DAY_MS))
    }

    /// The opening window of the day containing `t`.
    pub fn window_for_day(&self, t: Ms) -> Span {
        let day = Self::day_start(t);
        Span::new(
            day.saturating_add(Ms::from(self.open_hour) * HOUR_MS),
            day.saturating_add(Ms::from(self.close_hour) * HOUR_MS),
        )
    }

    pub fn is_open_at(&self, t: Ms) -> bool {
        self.window_for_day(t).contains_instant(t)
    }

    /// True if `span` lies inside a single day's opening window.
    pub fn allows(&self, span: &Span) -> bool {
        self.window_for_day(span.start).contains_span(span)
    }

    /// Opening windows clipped to `query`, in order.
    pub fn windows_within(&self, query: &Span) -> Vec<Span> {
        let mut out = Vec::new();
        let mut day = Self::day_start(query.start);
        while day < query.end {
            let w = self.window_for_day(day);
            let start = w.start.max(query.start);
            let end = w.end.min(query.end);
            if start < end {
                out.push(Span::new(start, end));
            }
            day = day.saturating_add(DAY_MS);
        }
        out
    }
}

/// Store mutations. This is the WAL record format of the reference backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    StudioCreated { studio: Studio },
    StudioUpdated { studio: Studio },
    StudioDeleted { id: StudioId },
    BookingInserted { record: BookingRecord },
    BookingUpdated { record: BookingRecord },
    BookingDeleted { id: Ulid, studio_id: StudioId },
}
