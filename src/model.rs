use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MS_PER_MINUTE;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    /// Bounds are not checked here; booking validation rejects inverted or
    /// empty spans with a recoverable error.
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_ms() / MS_PER_MINUTE
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Booked,
    CheckedIn,
    Finished,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Booked | ReservationStatus::CheckedIn)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Booked => "booked",
            ReservationStatus::CheckedIn => "checked_in",
            ReservationStatus::Finished => "finished",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    Free,
    Reserved,
    Occupied,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Free => "free",
            StationStatus::Reserved => "reserved",
            StationStatus::Occupied => "occupied",
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

/// A time-boxed claim on one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    /// Opaque human-shareable token (printed on QR codes by the excluded layer).
    pub code: Ulid,
    pub user_id: Ulid,
    pub lab_id: Ulid,
    pub station_id: Ulid,
    pub span: Span,
    pub status: ReservationStatus,
    pub purpose: Option<String>,
    pub check_in_time: Option<Ms>,
    pub check_out_time: Option<Ms>,
    /// Set when created through the whole-lab booking path.
    pub bulk: bool,
    pub teacher_id: Option<Ulid>,
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Free-form hardware metadata, carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSpecs {
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub storage: Option<String>,
    #[serde(default)]
    pub software: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: Ulid,
    pub lab_id: Ulid,
    /// Unique, stored upper-cased (e.g. "ST-014").
    pub code: String,
    pub name: String,
    pub status: StationStatus,
    /// Back-reference to the active reservation currently claiming this station.
    /// Reserved/Occupied status implies this resolves to a Booked/CheckedIn
    /// reservation respectively; the self-heal sweep repairs violations.
    pub current_reservation_id: Option<Ulid>,
    pub active: bool,
    pub specs: StationSpecs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub start: String,
    pub end: String,
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self {
            start: "07:00".into(),
            end: "21:00".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lab {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    /// Derived station count, recomputed whenever stations are added or removed.
    pub capacity: u32,
    pub opening_hours: OpeningHours,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    Qr,
    Manual,
}

/// Request provenance attached to access-log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub ip: Option<String>,
    pub agent: Option<String>,
}

/// Append-only record of a check-in or check-out. Never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLog {
    pub id: Ulid,
    pub user_id: Ulid,
    pub reservation_id: Ulid,
    pub station_id: Ulid,
    pub action: AccessAction,
    pub method: AccessMethod,
    pub at: Ms,
    pub ip: Option<String>,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationUpdateReason {
    ReservationExpired,
    AutoCheckout,
}

/// Published event types — flat, no nesting. Fan-out is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation_id: Ulid,
        station_id: Ulid,
        user_id: Ulid,
    },
    ReservationCheckin {
        reservation_id: Ulid,
        station_id: Ulid,
    },
    ReservationCheckout {
        reservation_id: Ulid,
        station_id: Ulid,
    },
    ReservationCancelled {
        reservation_id: Ulid,
        station_id: Ulid,
    },
    ReservationNoShow {
        reservation_id: Ulid,
        station_id: Ulid,
    },
    ReservationFinished {
        reservation_id: Ulid,
        station_id: Ulid,
        auto_finished: bool,
    },
    StationCreated {
        station_id: Ulid,
        lab_id: Ulid,
        code: String,
    },
    StationUpdated {
        station_id: Ulid,
        status: StationStatus,
        reason: Option<StationUpdateReason>,
    },
    BulkReservationCancelled {
        lab_id: Ulid,
        teacher_id: Ulid,
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_duration_minutes_floors() {
        let s = Span::new(0, 14 * MS_PER_MINUTE + 59_999);
        assert_eq!(s.duration_minutes(), 14);
    }

    #[test]
    fn status_activity() {
        assert!(ReservationStatus::Booked.is_active());
        assert!(ReservationStatus::CheckedIn.is_active());
        assert!(ReservationStatus::Finished.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::NoShow.is_terminal());
    }

    #[test]
    fn status_labels() {
        assert_eq!(ReservationStatus::CheckedIn.as_str(), "checked_in");
        assert_eq!(StationStatus::Occupied.as_str(), "occupied");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationFinished {
            reservation_id: Ulid::new(),
            station_id: Ulid::new(),
            auto_finished: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, decoded);
    }
}
