use crate::model::Ms;

// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Longest single booking: one week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

/// Widest window accepted by availability queries: one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_000;
pub const MAX_STUDIO_NAME_LEN: usize = 200;
pub const MAX_STUDIO_TEXT_LEN: usize = 10_000;

pub const MAX_BOOKINGS_PER_STUDIO: usize = 100_000;
