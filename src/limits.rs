//! Policy constants for booking validation.

use crate::model::Ms;

pub const MS_PER_MINUTE: Ms = 60_000;

/// Minimum booking duration, individual and bulk alike.
pub const MIN_DURATION_MS: Ms = 30 * MS_PER_MINUTE;

/// Maximum duration for an individual station booking (4 hours).
pub const MAX_SINGLE_DURATION_MS: Ms = 240 * MS_PER_MINUTE;

/// Maximum duration for a whole-lab booking (8 hours).
pub const MAX_BULK_DURATION_MS: Ms = 480 * MS_PER_MINUTE;

/// Mandatory idle time between two reservations on the same station.
/// A gap of exactly this much passes; anything less is rejected.
pub const BUFFER_MS: Ms = 15 * MS_PER_MINUTE;
pub const BUFFER_MINUTES: i64 = BUFFER_MS / MS_PER_MINUTE;

/// Check-in must happen within `[start, start + window)`.
pub const DEFAULT_CHECK_IN_WINDOW_MS: Ms = 10 * MS_PER_MINUTE;

pub const MAX_PURPOSE_LEN: usize = 200;
pub const MIN_LAB_NAME_LEN: usize = 3;
pub const MAX_LAB_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Purpose recorded on whole-lab bookings when the teacher gives none.
pub const DEFAULT_BULK_PURPOSE: &str = "Class session (full lab)";
