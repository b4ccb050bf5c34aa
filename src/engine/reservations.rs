//! Reservation creation and the manual state-machine transitions.
//!
//! Every transition is a compare-and-swap on the reservation record with an
//! expected prior status; the CAS is the linearization point, and station
//! sync, access logging, and event publication follow it. A racing actor
//! (concurrent check-in, the reclaimer) loses the CAS and gets a guard
//! error instead of double-applying side effects.

use ulid::Ulid;

use crate::limits::MAX_SINGLE_DURATION_MS;
use crate::model::*;
use crate::observability;

use super::conflict;
use super::{Engine, EngineError, cas_to_engine};

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub user_id: Ulid,
    pub lab_id: Ulid,
    pub station_id: Ulid,
    pub span: Span,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedReservation {
    pub reservation_id: Ulid,
    pub code: Ulid,
}

impl Engine {
    pub fn create_reservation(&self, req: NewReservation) -> Result<CreatedReservation, EngineError> {
        let station = self
            .store
            .get_station(&req.station_id)
            .ok_or(EngineError::NotFound(req.station_id))?;
        if !station.active {
            return Err(EngineError::Validation("station is not active"));
        }
        if station.lab_id != req.lab_id {
            return Err(EngineError::Validation("station does not belong to that lab"));
        }

        // Station status is deliberately NOT checked here: a station may hold
        // several bookings in different time slots. Conflicts are decided by
        // the range checks below.
        let now = self.now();
        conflict::validate_candidate(&req.span, now, MAX_SINGLE_DURATION_MS)?;
        conflict::validate_purpose(&req.purpose)?;

        // User-level exclusivity first: one person, one station at a time.
        let user_active = self.store.active_for_user(&req.user_id);
        if let Some(other) = conflict::find_user_overlap(&req.span, &user_active) {
            metrics::counter!(observability::CONFLICTS_TOTAL, "kind" => "user_time_conflict")
                .increment(1);
            return Err(EngineError::Conflict(super::ConflictDetails {
                kind: super::ConflictKind::UserTimeConflict,
                existing: other.span,
                station_id: other.station_id,
                gap_minutes: None,
            }));
        }

        // Station-level overlap and buffer checks.
        let existing = self.store.active_for_station(&req.station_id, None);
        if let Err(e) = conflict::evaluate(&req.span, &existing, None) {
            if let EngineError::Conflict(details) = &e {
                metrics::counter!(observability::CONFLICTS_TOTAL, "kind" => details.kind.as_str())
                    .increment(1);
            }
            return Err(e);
        }

        let reservation = Reservation {
            id: Ulid::new(),
            code: Ulid::new(),
            user_id: req.user_id,
            lab_id: req.lab_id,
            station_id: req.station_id,
            span: req.span,
            status: ReservationStatus::Booked,
            purpose: req.purpose,
            check_in_time: None,
            check_out_time: None,
            bulk: false,
            teacher_id: None,
            created_at: now,
        };
        let created = CreatedReservation {
            reservation_id: reservation.id,
            code: reservation.code,
        };
        self.store.insert_reservation(reservation.clone());
        self.reserve_station(&reservation);

        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL, "bulk" => "false").increment(1);
        tracing::info!(
            reservation = %reservation.id,
            station = %reservation.station_id,
            "reservation created"
        );
        self.publish(Event::ReservationCreated {
            reservation_id: reservation.id,
            station_id: reservation.station_id,
            user_id: reservation.user_id,
        });
        Ok(created)
    }

    /// Booked → CheckedIn, only within the check-in window.
    pub fn check_in(
        &self,
        id: Ulid,
        method: AccessMethod,
        provenance: Provenance,
    ) -> Result<Reservation, EngineError> {
        let reservation = self
            .store
            .get_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        if reservation.status != ReservationStatus::Booked {
            metrics::counter!(observability::GUARD_REJECTIONS_TOTAL).increment(1);
            return Err(EngineError::Guard {
                action: "check in",
                status: reservation.status,
            });
        }

        let now = self.now();
        if now < reservation.span.start {
            return Err(EngineError::CheckInTooEarly {
                start: reservation.span.start,
            });
        }
        let window = self.check_in_window_ms();
        if now >= reservation.span.start + window {
            return Err(EngineError::CheckInWindowExpired {
                window_minutes: window / crate::limits::MS_PER_MINUTE,
            });
        }

        let updated = self
            .store
            .transition_reservation(id, ReservationStatus::Booked, |r| {
                r.status = ReservationStatus::CheckedIn;
                r.check_in_time = Some(now);
            })
            .map_err(|e| cas_to_engine(e, id, "check in"))?;

        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => "check_in").increment(1);
        self.occupy_station(&updated);
        self.log_access(&updated, AccessAction::CheckIn, method, provenance);
        tracing::info!(reservation = %id, "checked in");
        self.publish(Event::ReservationCheckin {
            reservation_id: updated.id,
            station_id: updated.station_id,
        });
        Ok(updated)
    }

    /// CheckedIn → Finished, any time after check-in.
    pub fn check_out(
        &self,
        id: Ulid,
        method: AccessMethod,
        provenance: Provenance,
    ) -> Result<Reservation, EngineError> {
        let now = self.now();
        let updated = self
            .store
            .transition_reservation(id, ReservationStatus::CheckedIn, |r| {
                r.status = ReservationStatus::Finished;
                r.check_out_time = Some(now);
            })
            .map_err(|e| cas_to_engine(e, id, "check out"))?;

        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => "check_out").increment(1);
        self.release_station_for(&updated, None);
        self.log_access(&updated, AccessAction::CheckOut, method, provenance);
        tracing::info!(reservation = %id, "checked out");
        self.publish(Event::ReservationCheckout {
            reservation_id: updated.id,
            station_id: updated.station_id,
        });
        Ok(updated)
    }

    /// Booked → Cancelled. Checked-in reservations must check out instead.
    pub fn cancel(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let updated = self
            .store
            .transition_reservation(id, ReservationStatus::Booked, |r| {
                r.status = ReservationStatus::Cancelled;
            })
            .map_err(|e| cas_to_engine(e, id, "cancel"))?;

        metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => "cancel").increment(1);
        self.release_station_for(&updated, None);
        tracing::info!(reservation = %id, "cancelled");
        self.publish(Event::ReservationCancelled {
            reservation_id: updated.id,
            station_id: updated.station_id,
        });
        Ok(updated)
    }
}
