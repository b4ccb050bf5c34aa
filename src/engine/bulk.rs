//! Whole-lab booking: a teacher claims every conflict-free station in a lab
//! for one class session, in a single batch.

use ulid::Ulid;

use crate::limits::{DEFAULT_BULK_PURPOSE, MAX_BULK_DURATION_MS};
use crate::model::*;
use crate::observability;

use super::conflict;
use super::error::{BulkRejection, EngineError};
use super::Engine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAccepted {
    pub station_id: Ulid,
    pub reservation_id: Ulid,
    pub code: Ulid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResult {
    pub total_stations: usize,
    pub accepted: Vec<BulkAccepted>,
    pub rejected: Vec<BulkRejection>,
}

impl Engine {
    /// Book every available station in a lab for one window. Stations are
    /// evaluated independently (station-level checks only; no user-level
    /// exclusivity in bulk mode since the operation claims many stations at
    /// once); the ones that pass are booked in one batch, the rest are
    /// reported with their conflict kind. Zero accepted stations fails the
    /// whole operation with no reservation created.
    pub fn book_lab(
        &self,
        lab_id: Ulid,
        span: Span,
        teacher_id: Ulid,
        role: Role,
        purpose: Option<String>,
    ) -> Result<BulkResult, EngineError> {
        if role != Role::Teacher {
            return Err(EngineError::Forbidden("only teachers can book a whole lab"));
        }
        let lab = self
            .store
            .get_lab(&lab_id)
            .ok_or(EngineError::NotFound(lab_id))?;
        if !lab.active {
            return Err(EngineError::Validation("lab is not active"));
        }

        let now = self.now();
        conflict::validate_candidate(&span, now, MAX_BULK_DURATION_MS)?;
        conflict::validate_purpose(&purpose)?;

        let stations: Vec<Station> = self
            .store
            .stations_in_lab(&lab_id)
            .into_iter()
            .filter(|s| s.active)
            .collect();
        if stations.is_empty() {
            return Err(EngineError::Validation("lab has no active stations"));
        }
        let total_stations = stations.len();

        // Phase 1: evaluate each station independently.
        let mut available = Vec::new();
        let mut rejected = Vec::new();
        for station in stations {
            let existing = self.store.active_for_station(&station.id, None);
            match conflict::evaluate(&span, &existing, None) {
                Ok(()) => available.push(station),
                Err(EngineError::Conflict(details)) => {
                    metrics::counter!(observability::CONFLICTS_TOTAL, "kind" => details.kind.as_str())
                        .increment(1);
                    rejected.push(BulkRejection {
                        station_id: station.id,
                        station_code: station.code,
                        kind: details.kind,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        if available.is_empty() {
            return Err(EngineError::NoStationsAvailable {
                total_stations,
                rejected,
            });
        }

        // Phase 2: all evaluated — commit the batch.
        let purpose = Some(purpose.unwrap_or_else(|| DEFAULT_BULK_PURPOSE.to_string()));
        let mut accepted = Vec::with_capacity(available.len());
        for station in &available {
            let reservation = Reservation {
                id: Ulid::new(),
                code: Ulid::new(),
                user_id: teacher_id,
                lab_id,
                station_id: station.id,
                span,
                status: ReservationStatus::Booked,
                purpose: purpose.clone(),
                check_in_time: None,
                check_out_time: None,
                bulk: true,
                teacher_id: Some(teacher_id),
                created_at: now,
            };
            accepted.push(BulkAccepted {
                station_id: station.id,
                reservation_id: reservation.id,
                code: reservation.code,
            });
            self.store.insert_reservation(reservation.clone());
            self.reserve_station(&reservation);
            metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL, "bulk" => "true")
                .increment(1);
            self.publish(Event::ReservationCreated {
                reservation_id: reservation.id,
                station_id: station.id,
                user_id: teacher_id,
            });
        }

        tracing::info!(
            lab = %lab_id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            "whole-lab booking"
        );
        Ok(BulkResult {
            total_stations,
            accepted,
            rejected,
        })
    }

    /// Cancel all of a teacher's bulk reservations in a lab at one exact
    /// start time, freeing their stations. Returns the number cancelled.
    pub fn cancel_lab(&self, lab_id: Ulid, start: Ms, teacher_id: Ulid) -> Result<usize, EngineError> {
        let targets = self.store.reservations_where(|r| {
            r.bulk
                && r.lab_id == lab_id
                && r.teacher_id == Some(teacher_id)
                && r.span.start == start
                && r.is_active()
        });

        let mut cancelled = 0usize;
        for target in targets {
            // CAS from whatever active status the snapshot saw; a racing
            // transition loses the record from this batch, which is fine.
            let result = self
                .store
                .transition_reservation(target.id, target.status, |r| {
                    r.status = ReservationStatus::Cancelled;
                });
            match result {
                Ok(updated) => {
                    cancelled += 1;
                    metrics::counter!(observability::TRANSITIONS_TOTAL, "action" => "cancel")
                        .increment(1);
                    self.release_station_for(&updated, None);
                }
                Err(e) => {
                    tracing::debug!(reservation = %target.id, "bulk cancel skip: {e:?}");
                }
            }
        }

        if cancelled > 0 {
            self.publish(Event::BulkReservationCancelled {
                lab_id,
                teacher_id,
                count: cancelled,
            });
        }
        tracing::info!(lab = %lab_id, cancelled, "bulk cancellation");
        Ok(cancelled)
    }
}
