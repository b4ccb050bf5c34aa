use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use ulid::Ulid;

use labbook::clock::ManualClock;
use labbook::engine::{Engine, EngineConfig, NewLab, NewReservation, NewStation};
use labbook::model::*;
use labbook::notify::NotifyHub;

// ── Test infrastructure ──────────────────────────────────────

const T0: Ms = 1_700_000_000_000;
const M: Ms = 60_000;
const H: Ms = 3_600_000;

fn start_engine() -> (Arc<Engine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = Engine::new(
        Arc::new(NotifyHub::new()),
        clock.clone(),
        EngineConfig::default(),
    );
    (Arc::new(engine), clock)
}

fn seed_lab(engine: &Engine, stations: usize) -> (Ulid, Vec<Ulid>) {
    let lab = engine
        .create_lab(NewLab {
            name: "Electronics Lab".into(),
            location: "Building A, floor 2".into(),
            description: Some("Oscilloscopes and soldering benches".into()),
            opening_hours: None,
        })
        .unwrap();
    let ids = (1..=stations)
        .map(|n| {
            engine
                .create_station(NewStation {
                    lab_id: lab.id,
                    code: format!("el-{n:03}"),
                    name: format!("Bench {n}"),
                    specs: StationSpecs::default(),
                })
                .unwrap()
                .id
        })
        .collect();
    (lab.id, ids)
}

/// Wait for an event matching the predicate, skipping others, with timeout.
async fn recv_event(
    rx: &mut broadcast::Receiver<Event>,
    mut matching: impl FnMut(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if matching(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ── Full reservation lifecycle ───────────────────────────────

#[tokio::test]
async fn booked_to_finished_with_events() {
    let (engine, clock) = start_engine();
    let (lab_id, stations) = seed_lab(&engine, 1);
    let mut events = engine.notify.subscribe();
    let user = Ulid::new();

    let created = engine
        .create_reservation(NewReservation {
            user_id: user,
            lab_id,
            station_id: stations[0],
            span: Span::new(T0 + H, T0 + 2 * H),
            purpose: Some("PCB assembly".into()),
        })
        .unwrap();

    // Station sync publishes before the reservation event in every flow.
    recv_event(&mut events, |e| {
        matches!(
            e,
            Event::StationUpdated {
                status: StationStatus::Reserved,
                ..
            }
        )
    })
    .await;
    let event = recv_event(&mut events, |e| {
        matches!(e, Event::ReservationCreated { .. })
    })
    .await;
    assert_eq!(
        event,
        Event::ReservationCreated {
            reservation_id: created.reservation_id,
            station_id: stations[0],
            user_id: user,
        }
    );

    clock.set(T0 + H + 2 * M);
    engine
        .check_in(created.reservation_id, AccessMethod::Qr, Provenance::default())
        .unwrap();
    recv_event(&mut events, |e| {
        matches!(
            e,
            Event::StationUpdated {
                status: StationStatus::Occupied,
                ..
            }
        )
    })
    .await;
    recv_event(&mut events, |e| {
        matches!(e, Event::ReservationCheckin { .. })
    })
    .await;

    clock.set(T0 + 100 * M);
    let finished = engine
        .check_out(created.reservation_id, AccessMethod::Manual, Provenance::default())
        .unwrap();
    assert_eq!(finished.status, ReservationStatus::Finished);
    let event = recv_event(&mut events, |e| {
        matches!(e, Event::StationUpdated { .. })
    })
    .await;
    assert!(matches!(
        event,
        Event::StationUpdated {
            status: StationStatus::Free,
            reason: None,
            ..
        }
    ));
    recv_event(&mut events, |e| {
        matches!(e, Event::ReservationCheckout { .. })
    })
    .await;

    // Two access-log entries; the per-user query returns newest first.
    let logs = engine.access_logs_for_user(user);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action, AccessAction::CheckOut);
    assert_eq!(logs[1].action, AccessAction::CheckIn);

    // The per-reservation query is chronological.
    let history = engine.access_logs_for_reservation(created.reservation_id);
    assert_eq!(history[0].action, AccessAction::CheckIn);
    assert_eq!(history[1].action, AccessAction::CheckOut);
}

// ── Reclamation through the public surface ───────────────────

#[tokio::test]
async fn missed_check_in_becomes_no_show_with_expiry_event() {
    let (engine, clock) = start_engine();
    let (lab_id, stations) = seed_lab(&engine, 1);
    let mut events = engine.notify.subscribe();

    let created = engine
        .create_reservation(NewReservation {
            user_id: Ulid::new(),
            lab_id,
            station_id: stations[0],
            span: Span::new(T0 + H, T0 + 90 * M),
            purpose: None,
        })
        .unwrap();

    clock.set(T0 + H + 11 * M);
    let report = engine.run_reclamation();
    assert_eq!(report.no_shows, 1);

    let event = recv_event(&mut events, |e| {
        matches!(
            e,
            Event::StationUpdated {
                status: StationStatus::Free,
                ..
            }
        )
    })
    .await;
    assert!(matches!(
        event,
        Event::StationUpdated {
            reason: Some(StationUpdateReason::ReservationExpired),
            ..
        }
    ));
    recv_event(&mut events, |e| {
        matches!(e, Event::ReservationNoShow { .. })
    })
    .await;

    // The slot is reclaimable by someone else right away.
    engine
        .create_reservation(NewReservation {
            user_id: Ulid::new(),
            lab_id,
            station_id: stations[0],
            span: Span::new(T0 + 2 * H, T0 + 3 * H),
            purpose: None,
        })
        .unwrap();
    assert_eq!(
        engine.reservation(created.reservation_id).unwrap().status,
        ReservationStatus::NoShow
    );
}

#[tokio::test]
async fn forgotten_check_out_auto_finishes_at_scheduled_end() {
    let (engine, clock) = start_engine();
    let (lab_id, stations) = seed_lab(&engine, 1);

    let created = engine
        .create_reservation(NewReservation {
            user_id: Ulid::new(),
            lab_id,
            station_id: stations[0],
            span: Span::new(T0 + H, T0 + 2 * H),
            purpose: None,
        })
        .unwrap();
    clock.set(T0 + H + 5 * M);
    engine
        .check_in(created.reservation_id, AccessMethod::Qr, Provenance::default())
        .unwrap();

    clock.set(T0 + 3 * H);
    let report = engine.run_reclamation();
    assert_eq!(report.auto_finished, 1);

    let r = engine.reservation(created.reservation_id).unwrap();
    assert_eq!(r.status, ReservationStatus::Finished);
    assert_eq!(r.check_out_time, Some(T0 + 2 * H));
    assert_eq!(
        engine.station(stations[0]).unwrap().status,
        StationStatus::Free
    );
}

// ── Whole-lab session end to end ─────────────────────────────

#[tokio::test]
async fn class_session_books_runs_and_cancels() {
    let (engine, clock) = start_engine();
    let (lab_id, stations) = seed_lab(&engine, 4);
    let teacher = Ulid::new();

    // One student grabbed a bench before the teacher did.
    let student = engine
        .create_reservation(NewReservation {
            user_id: Ulid::new(),
            lab_id,
            station_id: stations[0],
            span: Span::new(T0 + H, T0 + 2 * H),
            purpose: None,
        })
        .unwrap();

    let session = engine
        .book_lab(
            lab_id,
            Span::new(T0 + H, T0 + 3 * H),
            teacher,
            Role::Teacher,
            Some("Signal processing lecture".into()),
        )
        .unwrap();
    assert_eq!(session.accepted.len(), 3);
    assert_eq!(session.rejected.len(), 1);
    assert_eq!(session.rejected[0].station_id, stations[0]);

    // Class cancelled before it starts; the student's booking survives.
    clock.set(T0 + 30 * M);
    let cancelled = engine.cancel_lab(lab_id, T0 + H, teacher).unwrap();
    assert_eq!(cancelled, 3);
    assert_eq!(
        engine.reservation(student.reservation_id).unwrap().status,
        ReservationStatus::Booked
    );
    for accepted in &session.accepted {
        assert_eq!(
            engine.reservation(accepted.reservation_id).unwrap().status,
            ReservationStatus::Cancelled
        );
        assert_eq!(
            engine.station(accepted.station_id).unwrap().status,
            StationStatus::Free
        );
    }
}
