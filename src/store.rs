//! In-memory document store. Stands in for the transactional store the
//! excluded persistence layer would provide: plain CRUD plus per-record
//! conditional updates. Every state transition goes through
//! [`Store::transition_reservation`], a compare-and-swap on the record's
//! status, so two concurrent actors (say, a check-in racing the reclaimer)
//! cannot both apply side effects.

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasError {
    NotFound,
    /// The record was no longer in the expected status; carries what it was.
    Mismatch(ReservationStatus),
}

#[derive(Default)]
pub struct Store {
    labs: DashMap<Ulid, Lab>,
    stations: DashMap<Ulid, Station>,
    reservations: DashMap<Ulid, Reservation>,
    access_logs: DashMap<Ulid, AccessLog>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Labs ─────────────────────────────────────────────────

    pub fn insert_lab(&self, lab: Lab) {
        self.labs.insert(lab.id, lab);
    }

    pub fn get_lab(&self, id: &Ulid) -> Option<Lab> {
        self.labs.get(id).map(|e| e.value().clone())
    }

    pub fn list_labs(&self) -> Vec<Lab> {
        self.labs.iter().map(|e| e.value().clone()).collect()
    }

    /// Read-modify-write under the shard lock; returns the updated copy.
    pub fn update_lab(&self, id: Ulid, apply: impl FnOnce(&mut Lab)) -> Option<Lab> {
        let mut entry = self.labs.get_mut(&id)?;
        apply(&mut entry);
        Some(entry.clone())
    }

    // ── Stations ─────────────────────────────────────────────

    pub fn insert_station(&self, station: Station) {
        self.stations.insert(station.id, station);
    }

    pub fn get_station(&self, id: &Ulid) -> Option<Station> {
        self.stations.get(id).map(|e| e.value().clone())
    }

    pub fn remove_station(&self, id: &Ulid) -> Option<Station> {
        self.stations.remove(id).map(|(_, s)| s)
    }

    pub fn station_by_code(&self, code: &str) -> Option<Station> {
        self.stations
            .iter()
            .find(|e| e.value().code == code)
            .map(|e| e.value().clone())
    }

    pub fn stations_in_lab(&self, lab_id: &Ulid) -> Vec<Station> {
        let mut out: Vec<Station> = self
            .stations
            .iter()
            .filter(|e| e.value().lab_id == *lab_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn station_count_in_lab(&self, lab_id: &Ulid) -> u32 {
        self.stations
            .iter()
            .filter(|e| e.value().lab_id == *lab_id)
            .count() as u32
    }

    /// Read-modify-write under the shard lock; returns the updated copy.
    pub fn update_station(&self, id: Ulid, apply: impl FnOnce(&mut Station)) -> Option<Station> {
        let mut entry = self.stations.get_mut(&id)?;
        apply(&mut entry);
        Some(entry.clone())
    }

    /// Snapshot of stations matching a predicate (used by the self-heal sweep).
    pub fn stations_where(&self, pred: impl Fn(&Station) -> bool) -> Vec<Station> {
        self.stations
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Reservations ─────────────────────────────────────────

    pub fn insert_reservation(&self, reservation: Reservation) {
        self.reservations.insert(reservation.id, reservation);
    }

    pub fn get_reservation(&self, id: &Ulid) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    pub fn reservation_by_code(&self, code: &Ulid) -> Option<Reservation> {
        self.reservations
            .iter()
            .find(|e| e.value().code == *code)
            .map(|e| e.value().clone())
    }

    /// Active reservations on one station, ordered by start ascending.
    pub fn active_for_station(&self, station_id: &Ulid, excluding: Option<Ulid>) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|e| {
                let r = e.value();
                r.station_id == *station_id && r.is_active() && Some(r.id) != excluding
            })
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|r| r.span.start);
        out
    }

    /// Active reservations held by one user, on any station.
    pub fn active_for_user(&self, user_id: &Ulid) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|e| e.value().user_id == *user_id && e.value().is_active())
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn has_active_for_station(&self, station_id: &Ulid) -> bool {
        self.reservations
            .iter()
            .any(|e| e.value().station_id == *station_id && e.value().is_active())
    }

    /// Snapshot of reservations matching a predicate (used by sweeps and queries).
    pub fn reservations_where(&self, pred: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Compare-and-swap: apply the mutation only if the record is still in
    /// `expected` status. The check and the mutation happen under the shard
    /// lock, so they are atomic with respect to other writers.
    pub fn transition_reservation(
        &self,
        id: Ulid,
        expected: ReservationStatus,
        apply: impl FnOnce(&mut Reservation),
    ) -> Result<Reservation, CasError> {
        let mut entry = self.reservations.get_mut(&id).ok_or(CasError::NotFound)?;
        if entry.status != expected {
            return Err(CasError::Mismatch(entry.status));
        }
        apply(&mut entry);
        Ok(entry.clone())
    }

    // ── Access logs ──────────────────────────────────────────

    pub fn append_access_log(&self, log: AccessLog) {
        self.access_logs.insert(log.id, log);
    }

    pub fn access_logs_for_reservation(&self, reservation_id: &Ulid) -> Vec<AccessLog> {
        let mut out: Vec<AccessLog> = self
            .access_logs
            .iter()
            .filter(|e| e.value().reservation_id == *reservation_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|l| l.at);
        out
    }

    pub fn access_logs_for_user(&self, user_id: &Ulid) -> Vec<AccessLog> {
        let mut out: Vec<AccessLog> = self
            .access_logs
            .iter()
            .filter(|e| e.value().user_id == *user_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|l| std::cmp::Reverse(l.at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            code: Ulid::new(),
            user_id: Ulid::new(),
            lab_id: Ulid::new(),
            station_id: Ulid::new(),
            span: Span::new(1_000, 2_000),
            status,
            purpose: None,
            check_in_time: None,
            check_out_time: None,
            bulk: false,
            teacher_id: None,
            created_at: 0,
        }
    }

    #[test]
    fn cas_applies_when_status_matches() {
        let store = Store::new();
        let r = reservation(ReservationStatus::Booked);
        let id = r.id;
        store.insert_reservation(r);

        let updated = store
            .transition_reservation(id, ReservationStatus::Booked, |r| {
                r.status = ReservationStatus::CheckedIn;
                r.check_in_time = Some(1_100);
            })
            .unwrap();
        assert_eq!(updated.status, ReservationStatus::CheckedIn);
        assert_eq!(store.get_reservation(&id).unwrap().check_in_time, Some(1_100));
    }

    #[test]
    fn cas_rejects_on_status_mismatch() {
        let store = Store::new();
        let r = reservation(ReservationStatus::CheckedIn);
        let id = r.id;
        store.insert_reservation(r);

        let err = store
            .transition_reservation(id, ReservationStatus::Booked, |r| {
                r.status = ReservationStatus::Cancelled;
            })
            .unwrap_err();
        assert_eq!(err, CasError::Mismatch(ReservationStatus::CheckedIn));
        // Nothing was applied
        assert_eq!(
            store.get_reservation(&id).unwrap().status,
            ReservationStatus::CheckedIn
        );
    }

    #[test]
    fn cas_missing_record() {
        let store = Store::new();
        let err = store
            .transition_reservation(Ulid::new(), ReservationStatus::Booked, |_| {})
            .unwrap_err();
        assert_eq!(err, CasError::NotFound);
    }

    #[test]
    fn active_for_station_sorted_and_filtered() {
        let store = Store::new();
        let station_id = Ulid::new();
        let mut a = reservation(ReservationStatus::Booked);
        a.station_id = station_id;
        a.span = Span::new(3_000, 4_000);
        let mut b = reservation(ReservationStatus::CheckedIn);
        b.station_id = station_id;
        b.span = Span::new(1_000, 2_000);
        let mut c = reservation(ReservationStatus::Finished);
        c.station_id = station_id;
        store.insert_reservation(a.clone());
        store.insert_reservation(b.clone());
        store.insert_reservation(c);

        let active = store.active_for_station(&station_id, None);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, b.id);
        assert_eq!(active[1].id, a.id);

        let excluded = store.active_for_station(&station_id, Some(b.id));
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].id, a.id);
    }
}
