//! Background reclaimer: periodically force-transitions reservations whose
//! check-in window or end time has elapsed, and repairs stations whose
//! back-reference no longer matches reality. Both passes are idempotent and
//! coordinate only through the store, so redundant sweeps (several process
//! instances, or a manual trigger racing the timer) are safe.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;
use crate::model::*;
use crate::observability;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Booked reservations forced to no-show.
    pub no_shows: usize,
    /// Checked-in reservations auto-finished at their scheduled end.
    pub auto_finished: usize,
    /// Stations whose stale status or back-reference was repaired.
    pub repaired_stations: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.no_shows == 0 && self.auto_finished == 0 && self.repaired_stations == 0
    }
}

impl Engine {
    /// Expiry sweep. A booked reservation is reclaimed once its check-in
    /// window has closed or its end has passed, whichever comes first; a
    /// checked-in reservation is finished once its end has passed. Failures
    /// are isolated per record: a lost CAS race or a bad record is skipped,
    /// never aborts the sweep.
    pub fn sweep(&self, now: Ms) -> SweepReport {
        let mut report = SweepReport::default();
        let window = self.check_in_window_ms();

        let expired_booked = self.store.reservations_where(|r| {
            r.status == ReservationStatus::Booked
                && (now >= r.span.start + window || r.span.end < now)
        });
        for r in expired_booked {
            match self.force_no_show(r.id) {
                Ok(_) => {
                    report.no_shows += 1;
                    info!(reservation = %r.id, "reclaimed as no-show");
                }
                Err(e) => {
                    // Typically a concurrent check-in won the CAS.
                    tracing::debug!(reservation = %r.id, "sweep skip: {e}");
                }
            }
        }

        let expired_checked_in = self.store.reservations_where(|r| {
            r.status == ReservationStatus::CheckedIn && r.span.end < now
        });
        for r in expired_checked_in {
            match self.force_finish(r.id) {
                Ok(_) => {
                    report.auto_finished += 1;
                    info!(reservation = %r.id, "auto-finished");
                }
                Err(e) => {
                    tracing::debug!(reservation = %r.id, "sweep skip: {e}");
                }
            }
        }

        metrics::counter!(observability::SWEEP_NO_SHOW_TOTAL).increment(report.no_shows as u64);
        metrics::counter!(observability::SWEEP_AUTO_FINISHED_TOTAL)
            .increment(report.auto_finished as u64);
        report
    }

    /// Self-heal pass: every Reserved/Occupied station must point at an
    /// active, unexpired reservation in the matching status. Null, dangling,
    /// terminal, or expired back-references are repaired; expired active
    /// reservations get their forced transition first so both records end
    /// consistent. Callable on demand, independently of the expiry sweep.
    pub fn self_heal(&self, now: Ms) -> usize {
        let mut repaired = 0usize;

        let flagged = self
            .store
            .stations_where(|s| s.status != StationStatus::Free);
        for station in flagged {
            let verdict = match station.current_reservation_id {
                None => Some("missing back-reference"),
                Some(rid) => match self.store.get_reservation(&rid) {
                    None => Some("dangling back-reference"),
                    Some(r) if r.is_terminal() => Some("terminal reservation"),
                    Some(r) if r.span.end < now => {
                        // Force the reservation's own reclamation first; its
                        // release frees this station when the back-reference
                        // matches.
                        let forced = match r.status {
                            ReservationStatus::Booked => self.force_no_show(r.id).map(|_| ()),
                            ReservationStatus::CheckedIn => self.force_finish(r.id).map(|_| ()),
                            _ => Ok(()),
                        };
                        if let Err(e) = forced {
                            // Lost the CAS race; the next pass re-evaluates.
                            warn!(station = %station.id, reservation = %r.id, "heal skip: {e}");
                            continue;
                        }
                        match self.store.get_station(&station.id) {
                            Some(s) if s.status == StationStatus::Free => {
                                repaired += 1;
                                continue;
                            }
                            // The release did not touch this station, so the
                            // pointer was cross-linked. Clear it below.
                            _ => Some("expired reservation"),
                        }
                    }
                    Some(_) => None,
                },
            };

            if let Some(reason) = verdict {
                warn!(station = %station.id, code = %station.code, "healing station: {reason}");
                let mut changed = false;
                self.store.update_station(station.id, |s| {
                    // Re-check under the lock; a concurrent transition may
                    // have already fixed it.
                    if s.status != StationStatus::Free
                        && s.current_reservation_id == station.current_reservation_id
                    {
                        s.status = StationStatus::Free;
                        s.current_reservation_id = None;
                        changed = true;
                    }
                });
                if changed {
                    repaired += 1;
                    self.publish(Event::StationUpdated {
                        station_id: station.id,
                        status: StationStatus::Free,
                        reason: Some(StationUpdateReason::ReservationExpired),
                    });
                }
            }
        }

        metrics::counter!(observability::SWEEP_REPAIRED_STATIONS_TOTAL).increment(repaired as u64);
        repaired
    }

    /// Manual trigger: both passes in one call. Exposed for out-of-band and
    /// test invocation, independent of the timer.
    pub fn run_reclamation(&self) -> SweepReport {
        let now = self.now();
        let start = std::time::Instant::now();
        let mut report = self.sweep(now);
        report.repaired_stations = self.self_heal(now);
        metrics::counter!(observability::SWEEP_RUNS_TOTAL).increment(1);
        metrics::histogram!(observability::SWEEP_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        report
    }
}

/// Background task driving periodic reclamation. Runs once shortly after
/// startup, then on the fixed interval. Never exits on its own.
pub async fn run_reaper(engine: Arc<Engine>, interval: Duration, startup_delay: Duration) {
    tokio::time::sleep(startup_delay).await;
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let report = engine.run_reclamation();
        if !report.is_empty() {
            info!(
                no_shows = report.no_shows,
                auto_finished = report.auto_finished,
                repaired = report.repaired_stations,
                "reclamation pass"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{EngineConfig, NewLab, NewReservation, NewStation};
    use crate::limits::MS_PER_MINUTE;
    use crate::notify::NotifyHub;
    use ulid::Ulid;

    const T0: Ms = 1_700_000_000_000;
    const M: Ms = MS_PER_MINUTE;

    fn make_engine() -> (Arc<Engine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let engine = Engine::new(
            Arc::new(NotifyHub::new()),
            clock.clone(),
            EngineConfig::default(),
        );
        (Arc::new(engine), clock)
    }

    fn seed_station(engine: &Engine) -> (Ulid, Ulid) {
        let lab = engine
            .create_lab(NewLab {
                name: "Lab A".into(),
                location: "B1".into(),
                description: None,
                opening_hours: None,
            })
            .unwrap();
        let station = engine
            .create_station(NewStation {
                lab_id: lab.id,
                code: "st-001".into(),
                name: "Station 1".into(),
                specs: Default::default(),
            })
            .unwrap();
        (lab.id, station.id)
    }

    #[tokio::test]
    async fn sweep_reclaims_no_show_after_window() {
        let (engine, clock) = make_engine();
        let (lab_id, station_id) = seed_station(&engine);

        // Booked 09:00-09:30 relative to T0, 10 minute window.
        let created = engine
            .create_reservation(NewReservation {
                user_id: Ulid::new(),
                lab_id,
                station_id,
                span: Span::new(T0 + 60 * M, T0 + 90 * M),
                purpose: None,
            })
            .unwrap();

        // Window still open at start + 9min: nothing to reclaim.
        clock.set(T0 + 69 * M);
        assert_eq!(engine.run_reclamation(), SweepReport::default());

        // At start + 11min the window has closed, end not yet reached.
        clock.set(T0 + 71 * M);
        let report = engine.run_reclamation();
        assert_eq!(report.no_shows, 1);

        let r = engine.reservation(created.reservation_id).unwrap();
        assert_eq!(r.status, ReservationStatus::NoShow);
        let s = engine.station(station_id).unwrap();
        assert_eq!(s.status, StationStatus::Free);
        assert_eq!(s.current_reservation_id, None);

        // Idempotent: a second run finds nothing.
        assert_eq!(engine.run_reclamation(), SweepReport::default());
    }

    #[tokio::test]
    async fn sweep_auto_finishes_checked_in_at_end() {
        let (engine, clock) = make_engine();
        let (lab_id, station_id) = seed_station(&engine);

        let created = engine
            .create_reservation(NewReservation {
                user_id: Ulid::new(),
                lab_id,
                station_id,
                span: Span::new(T0 + 30 * M, T0 + 90 * M),
                purpose: None,
            })
            .unwrap();
        clock.set(T0 + 31 * M);
        engine
            .check_in(created.reservation_id, AccessMethod::Manual, Provenance::default())
            .unwrap();

        clock.set(T0 + 91 * M);
        let report = engine.run_reclamation();
        assert_eq!(report.auto_finished, 1);

        let r = engine.reservation(created.reservation_id).unwrap();
        assert_eq!(r.status, ReservationStatus::Finished);
        // Checkout stamped at the scheduled end, not at sweep time.
        assert_eq!(r.check_out_time, Some(T0 + 90 * M));
        assert_eq!(
            engine.station(station_id).unwrap().status,
            StationStatus::Free
        );
    }

    #[tokio::test]
    async fn reaper_task_runs_on_interval() {
        let (engine, clock) = make_engine();
        let (lab_id, station_id) = seed_station(&engine);
        let created = engine
            .create_reservation(NewReservation {
                user_id: Ulid::new(),
                lab_id,
                station_id,
                span: Span::new(T0 + 60 * M, T0 + 90 * M),
                purpose: None,
            })
            .unwrap();
        clock.set(T0 + 120 * M);

        let handle = tokio::spawn(run_reaper(
            engine.clone(),
            Duration::from_millis(10),
            Duration::from_millis(0),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(
            engine.reservation(created.reservation_id).unwrap().status,
            ReservationStatus::NoShow
        );
    }
}
