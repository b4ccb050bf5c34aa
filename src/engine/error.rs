use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::BUFFER_MINUTES;
use crate::model::{Ms, ReservationStatus, Span};

/// Why a candidate booking was rejected against an existing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Candidate starts during an existing reservation.
    OverlapStart,
    /// Candidate ends during an existing reservation.
    OverlapEnd,
    /// Candidate fully contains an existing reservation.
    Contains,
    /// Candidate starts too soon after an existing reservation ends.
    BufferAfter,
    /// Candidate ends too soon before an existing reservation starts.
    BufferBefore,
    /// The requesting user already holds an overlapping reservation elsewhere.
    UserTimeConflict,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::OverlapStart => "overlap_start",
            ConflictKind::OverlapEnd => "overlap_end",
            ConflictKind::Contains => "contains",
            ConflictKind::BufferAfter => "buffer_after",
            ConflictKind::BufferBefore => "buffer_before",
            ConflictKind::UserTimeConflict => "user_time_conflict",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection payload: the kind plus the offending reservation's bounds,
/// for caller display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetails {
    pub kind: ConflictKind,
    /// Bounds of the reservation the candidate collided with.
    pub existing: Span,
    /// Station holding the offending reservation (differs from the requested
    /// station for user-level conflicts).
    pub station_id: Ulid,
    /// Actual separation in whole minutes, for buffer rejections.
    pub gap_minutes: Option<i64>,
}

/// One station's rejection inside a whole-lab booking result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRejection {
    pub station_id: Ulid,
    pub station_code: String,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or out-of-range input. Nothing was mutated.
    Validation(&'static str),
    /// The booking would violate overlap, buffer, or user-exclusivity rules.
    Conflict(ConflictDetails),
    /// A state-machine transition was attempted from the wrong status.
    Guard {
        action: &'static str,
        status: ReservationStatus,
    },
    /// Check-in attempted before the reservation starts.
    CheckInTooEarly { start: Ms },
    /// Check-in attempted after the window closed.
    CheckInWindowExpired { window_minutes: i64 },
    NotFound(Ulid),
    Forbidden(&'static str),
    /// Whole-lab booking found no bookable station; carries every rejection.
    NoStationsAvailable {
        total_stations: usize,
        rejected: Vec<BulkRejection>,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::Conflict(details) => match details.kind {
                ConflictKind::UserTimeConflict => write!(
                    f,
                    "you already hold a reservation in [{}, {}); a user cannot occupy two stations at once",
                    details.existing.start, details.existing.end
                ),
                ConflictKind::BufferAfter | ConflictKind::BufferBefore => write!(
                    f,
                    "at least {BUFFER_MINUTES} minutes required between reservations; only {} minutes of separation",
                    details.gap_minutes.unwrap_or(0)
                ),
                kind => write!(
                    f,
                    "conflict ({kind}) with existing reservation [{}, {})",
                    details.existing.start, details.existing.end
                ),
            },
            EngineError::Guard { action, status } => {
                write!(f, "cannot {action}: current status is {status}")
            }
            EngineError::CheckInTooEarly { start } => {
                write!(f, "check-in not open yet: reservation starts at {start}")
            }
            EngineError::CheckInWindowExpired { window_minutes } => write!(
                f,
                "check-in window expired: check-in must happen within the first {window_minutes} minutes"
            ),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::NoStationsAvailable {
                total_stations,
                rejected,
            } => write!(
                f,
                "no stations available in this time slot: all {total_stations} conflict ({} rejections)",
                rejected.len()
            ),
        }
    }
}

impl std::error::Error for EngineError {}
