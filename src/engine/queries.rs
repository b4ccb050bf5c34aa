use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub fn reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store
            .get_reservation(&id)
            .ok_or(EngineError::NotFound(id))
    }

    /// Look a reservation up by its shareable code (the QR payload).
    pub fn lookup_by_code(&self, code: Ulid) -> Result<Reservation, EngineError> {
        self.store
            .reservation_by_code(&code)
            .ok_or(EngineError::NotFound(code))
    }

    /// A user's reservations, newest start first. `active_only` narrows to
    /// Booked/CheckedIn; `status` narrows to one exact status.
    pub fn reservations_for_user(
        &self,
        user_id: Ulid,
        status: Option<ReservationStatus>,
        active_only: bool,
    ) -> Vec<Reservation> {
        let mut out = self.store.reservations_where(|r| {
            r.user_id == user_id
                && status.is_none_or(|s| r.status == s)
                && (!active_only || r.is_active())
        });
        out.sort_by_key(|r| std::cmp::Reverse(r.span.start));
        out
    }

    /// Active reservations on a station, ordered by start ascending.
    pub fn active_for_station(&self, station_id: Ulid) -> Vec<Reservation> {
        self.store.active_for_station(&station_id, None)
    }

    /// All reservations, optionally narrowed by status, lab, and a window
    /// the reservation's start must fall in.
    pub fn all_reservations(
        &self,
        status: Option<ReservationStatus>,
        lab_id: Option<Ulid>,
        starting_in: Option<Span>,
    ) -> Vec<Reservation> {
        let mut out = self.store.reservations_where(|r| {
            status.is_none_or(|s| r.status == s)
                && lab_id.is_none_or(|l| r.lab_id == l)
                && starting_in.is_none_or(|w| w.contains_instant(r.span.start))
        });
        out.sort_by_key(|r| std::cmp::Reverse(r.span.start));
        out
    }

    pub fn station(&self, id: Ulid) -> Result<Station, EngineError> {
        self.store.get_station(&id).ok_or(EngineError::NotFound(id))
    }

    pub fn station_by_code(&self, code: &str) -> Option<Station> {
        self.store.station_by_code(&code.trim().to_uppercase())
    }

    /// Stations in a lab, ordered by code.
    pub fn stations_in_lab(&self, lab_id: Ulid) -> Vec<Station> {
        self.store.stations_in_lab(&lab_id)
    }

    pub fn lab(&self, id: Ulid) -> Result<Lab, EngineError> {
        self.store.get_lab(&id).ok_or(EngineError::NotFound(id))
    }

    pub fn labs(&self) -> Vec<Lab> {
        let mut out = self.store.list_labs();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn access_logs_for_reservation(&self, reservation_id: Ulid) -> Vec<AccessLog> {
        self.store.access_logs_for_reservation(&reservation_id)
    }

    pub fn access_logs_for_user(&self, user_id: Ulid) -> Vec<AccessLog> {
        self.store.access_logs_for_user(&user_id)
    }
}
