mod bulk;
mod conflict;
mod error;
mod queries;
mod reservations;
mod stations;

pub use bulk::{BulkAccepted, BulkResult};
pub use error::{BulkRejection, ConflictDetails, ConflictKind, EngineError};
pub use reservations::{CreatedReservation, NewReservation};
pub use stations::{NewLab, NewStation};

use std::sync::Arc;

use crate::clock::Clock;
use crate::limits::DEFAULT_CHECK_IN_WINDOW_MS;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::store::{CasError, Store};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Check-in is accepted within `[start, start + window)`.
    pub check_in_window_ms: Ms,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_in_window_ms: DEFAULT_CHECK_IN_WINDOW_MS,
        }
    }
}

pub struct Engine {
    pub store: Store,
    pub notify: Arc<NotifyHub>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(notify: Arc<NotifyHub>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store: Store::new(),
            notify,
            clock,
            config,
        }
    }

    pub(crate) fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    pub(crate) fn check_in_window_ms(&self) -> Ms {
        self.config.check_in_window_ms
    }

    pub(crate) fn publish(&self, event: Event) {
        metrics::counter!(
            observability::EVENTS_PUBLISHED_TOTAL,
            "event" => observability::event_label(&event)
        )
        .increment(1);
        self.notify.publish(&event);
    }

    pub(crate) fn log_access(
        &self,
        reservation: &Reservation,
        action: AccessAction,
        method: AccessMethod,
        provenance: Provenance,
    ) {
        self.store.append_access_log(AccessLog {
            id: ulid::Ulid::new(),
            user_id: reservation.user_id,
            reservation_id: reservation.id,
            station_id: reservation.station_id,
            action,
            method,
            at: self.now(),
            ip: provenance.ip,
            agent: provenance.agent,
        });
    }

    /// Point the station at a newly accepted reservation. Only a FREE
    /// station changes state: under the time-sliced policy a station may
    /// carry several non-overlapping bookings, and the pointer stays on
    /// whichever reservation claimed it first.
    pub(crate) fn reserve_station(&self, reservation: &Reservation) {
        let mut changed = false;
        let updated = self.store.update_station(reservation.station_id, |s| {
            if s.status == StationStatus::Free {
                s.status = StationStatus::Reserved;
                s.current_reservation_id = Some(reservation.id);
                changed = true;
            }
        });
        if changed && let Some(station) = updated {
            self.publish(Event::StationUpdated {
                station_id: station.id,
                status: station.status,
                reason: None,
            });
        }
    }

    /// Mark the station physically occupied by a checked-in reservation.
    pub(crate) fn occupy_station(&self, reservation: &Reservation) {
        if let Some(station) = self.store.update_station(reservation.station_id, |s| {
            s.status = StationStatus::Occupied;
            s.current_reservation_id = Some(reservation.id);
        }) {
            self.publish(Event::StationUpdated {
                station_id: station.id,
                status: station.status,
                reason: None,
            });
        }
    }

    /// Free the station, but only if its back-reference still points at the
    /// terminating reservation. A station claimed by a later booking keeps
    /// its pointer.
    pub(crate) fn release_station_for(
        &self,
        reservation: &Reservation,
        reason: Option<StationUpdateReason>,
    ) {
        let mut changed = false;
        let updated = self.store.update_station(reservation.station_id, |s| {
            if s.current_reservation_id == Some(reservation.id) {
                s.status = StationStatus::Free;
                s.current_reservation_id = None;
                changed = true;
            }
        });
        if changed && let Some(station) = updated {
            self.publish(Event::StationUpdated {
                station_id: station.id,
                status: station.status,
                reason,
            });
        }
    }

    /// Force a booked reservation to no-show: same effects as the automatic
    /// transition in the state machine. Used by the reclaimer.
    pub(crate) fn force_no_show(&self, id: ulid::Ulid) -> Result<Reservation, EngineError> {
        let updated = self
            .store
            .transition_reservation(id, ReservationStatus::Booked, |r| {
                r.status = ReservationStatus::NoShow;
            })
            .map_err(|e| cas_to_engine(e, id, "mark no-show"))?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => "no_show").increment(1);
        self.release_station_for(&updated, Some(StationUpdateReason::ReservationExpired));
        self.publish(Event::ReservationNoShow {
            reservation_id: updated.id,
            station_id: updated.station_id,
        });
        Ok(updated)
    }

    /// Force a checked-in reservation to finished with checkout at its
    /// scheduled end. Used by the reclaimer.
    pub(crate) fn force_finish(&self, id: ulid::Ulid) -> Result<Reservation, EngineError> {
        let updated = self
            .store
            .transition_reservation(id, ReservationStatus::CheckedIn, |r| {
                r.status = ReservationStatus::Finished;
                r.check_out_time = Some(r.span.end);
            })
            .map_err(|e| cas_to_engine(e, id, "auto-finish"))?;
        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => "auto_finish").increment(1);
        self.release_station_for(&updated, Some(StationUpdateReason::AutoCheckout));
        self.publish(Event::ReservationFinished {
            reservation_id: updated.id,
            station_id: updated.station_id,
            auto_finished: true,
        });
        Ok(updated)
    }
}

pub(crate) fn cas_to_engine(err: CasError, id: ulid::Ulid, action: &'static str) -> EngineError {
    match err {
        CasError::NotFound => EngineError::NotFound(id),
        CasError::Mismatch(status) => {
            metrics::counter!(observability::GUARD_REJECTIONS_TOTAL).increment(1);
            EngineError::Guard { action, status }
        }
    }
}
