//! End-to-end two-phase-commit scenarios, driven entirely through the
//! bus and HTTP surfaces — no internal API is called directly except to
//! pre-seed a conflicting reservation for the rejection scenario.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use ev_route_reservation::bus::messages::{ChosenRoute, JourneyFinished, ReservationOutcome, ReservationStatusMsg};
use ev_route_reservation::ledger::{InMemoryLedger, Ledger};
use ev_route_reservation::model::{RequestId, ReservationWindow, RouteSegment, TransactionId, VehicleId};
use ev_route_reservation::registry::{InMemoryRegistry, Registry};

use common::{recv_json, spawn_enterprise};

/// A window that has already elapsed, so the worker's charge tick fires
/// the instant the reservation is committed rather than ~10s later.
fn elapsed_window() -> ReservationWindow {
    let now = Utc::now();
    ReservationWindow::new(now - ChronoDuration::seconds(120), now - ChronoDuration::seconds(60))
}

fn chosen_route(vehicle_id: &str, request_id: &str, segments: Vec<RouteSegment>) -> ChosenRoute {
    ChosenRoute { request_id: request_id.to_string(), vehicle_id: vehicle_id.to_string(), route: segments }
}

/// Single-city success: origin == destination == Salvador, one idle
/// worker. Expect CONFIRMED, then a journey-finished once the committed
/// window elapses and is charged.
#[tokio::test]
async fn single_city_success() {
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());

    let salvador = spawn_enterprise("SolAtlantico", "Salvador", &["CP001"], &["CP001"], vec!["Salvador".to_string()], Arc::clone(&registry), Arc::clone(&ledger)).await;

    let mut status_rx = salvador.bus().subscribe("car/reservation/status/car-1");
    let mut journey_rx = salvador.bus().subscribe("car/journey/finished/car-1");

    let route = chosen_route("car-1", "req-1", vec![RouteSegment { city: "Salvador".to_string(), window: elapsed_window() }]);
    let topic = format!("car/route/{}", salvador.name);
    salvador.bus().publish(&topic, serde_json::to_vec(&route).unwrap()).await;

    let status: ReservationStatusMsg = recv_json(&mut status_rx, Duration::from_secs(2)).await;
    assert_eq!(status.status, ReservationOutcome::Confirmed);
    assert_eq!(status.vehicle_id, VehicleId::new("car-1"));
    assert!(status.confirmed_route.is_some());

    // The worker's charge tick runs every ~10s; the window is already
    // elapsed so the first tick charges it.
    let finished: JourneyFinished = recv_json(&mut journey_rx, Duration::from_secs(15)).await;
    assert_eq!(finished.status, "completed");
    assert_eq!(finished.transaction_id, status.transaction_id);

    let transaction = ledger.query_transaction(status.transaction_id.as_str()).await.expect("transaction recorded on the ledger");
    assert_eq!(transaction.status, "COMPLETED");
    assert_eq!(transaction.cost, 20.0);

    // Exercise the real HTTP `/status` surface a peer enterprise would
    // use for diagnostics.
    let status_response: serde_json::Value = reqwest::get(format!("{}/status", salvador.api_url)).await.unwrap().json().await.unwrap();
    assert_eq!(status_response["city"], "Salvador");
}

/// Two-city success with cost aggregation. Both enterprises reachable,
/// both workers idle. Expect both segments prepared and committed,
/// `RegisterReserve` called once, and `EndCharging` with the summed cost
/// `"40.00"`.
#[tokio::test]
async fn two_city_success_aggregates_cost() {
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());

    let salvador = spawn_enterprise(
        "SolAtlantico",
        "Salvador",
        &["CP001"],
        &["CP001"],
        vec!["Salvador".to_string(), "Ilheus".to_string()],
        Arc::clone(&registry),
        Arc::clone(&ledger),
    )
    .await;
    let _ilheus = spawn_enterprise(
        "BahiaEnergy",
        "Ilheus",
        &["CP002"],
        &["CP002"],
        vec!["Salvador".to_string(), "Ilheus".to_string()],
        Arc::clone(&registry),
        Arc::clone(&ledger),
    )
    .await;

    let mut status_rx = salvador.bus().subscribe("car/reservation/status/car-2");
    let mut journey_rx = salvador.bus().subscribe("car/journey/finished/car-2");

    let route = chosen_route(
        "car-2",
        "req-2",
        vec![
            RouteSegment { city: "Salvador".to_string(), window: elapsed_window() },
            RouteSegment { city: "Ilheus".to_string(), window: elapsed_window() },
        ],
    );
    let topic = format!("car/route/{}", salvador.name);
    salvador.bus().publish(&topic, serde_json::to_vec(&route).unwrap()).await;

    let status: ReservationStatusMsg = recv_json(&mut status_rx, Duration::from_secs(3)).await;
    assert_eq!(status.status, ReservationOutcome::Confirmed);

    let finished: JourneyFinished = recv_json(&mut journey_rx, Duration::from_secs(15)).await;
    assert!(finished.message.contains("40.00"), "message was: {}", finished.message);

    let transaction = ledger.query_transaction(status.transaction_id.as_str()).await.expect("transaction recorded on the ledger");
    assert_eq!(transaction.status, "COMPLETED");
    assert_eq!(transaction.cost, 40.0);
    assert_eq!(transaction.energy_consumed, 0.0);

    let history = ledger.get_transaction_history(status.transaction_id.as_str()).await.unwrap();
    let reserved_entries = history.iter().filter(|h| h.value.as_ref().map(|v| v.status == "RESERVED").unwrap_or(false)).count();
    assert_eq!(reserved_entries, 1, "RegisterReserve must only be called once");
}

/// Remote PREPARE rejection: Ilheus's only worker already holds an
/// overlapping committed reservation. Expect Salvador's local PREPARE to
/// succeed then be aborted, and Ilheus to never receive an ABORT (it was
/// never prepared for this transaction).
#[tokio::test]
async fn remote_prepare_rejection_aborts_only_prepared_participants() {
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());

    let salvador = spawn_enterprise(
        "SolAtlantico",
        "Salvador",
        &["CP001"],
        &["CP001"],
        vec!["Salvador".to_string(), "Ilheus".to_string()],
        Arc::clone(&registry),
        Arc::clone(&ledger),
    )
    .await;
    let ilheus = spawn_enterprise(
        "BahiaEnergy",
        "Ilheus",
        &["CP002"],
        &["CP002"],
        vec!["Salvador".to_string(), "Ilheus".to_string()],
        Arc::clone(&registry),
        Arc::clone(&ledger),
    )
    .await;

    // Pre-occupy Ilheus's worker with a committed reservation overlapping
    // the window the upcoming route will request.
    let conflicting_window = elapsed_window();
    ilheus
        .ctx
        .city
        .prepare_reservation(TransactionId::generate(), VehicleId::new("car-occupant"), RequestId::generate(), conflicting_window, None)
        .await
        .expect("the occupying reservation prepares cleanly");
    let occupant_tx = {
        let (_, _, reservations) = ilheus.ctx.city.city_availability().await;
        reservations[0].transaction_id.clone()
    };
    ilheus.ctx.city.commit_reservation(&occupant_tx).await;

    let mut status_rx = salvador.bus().subscribe("car/reservation/status/car-3");

    let route = chosen_route(
        "car-3",
        "req-3",
        vec![
            RouteSegment { city: "Salvador".to_string(), window: elapsed_window() },
            RouteSegment { city: "Ilheus".to_string(), window: conflicting_window },
        ],
    );
    let topic = format!("car/route/{}", salvador.name);
    salvador.bus().publish(&topic, serde_json::to_vec(&route).unwrap()).await;

    let status: ReservationStatusMsg = recv_json(&mut status_rx, Duration::from_secs(3)).await;
    assert_eq!(status.status, ReservationOutcome::Rejected);

    // Salvador's local reservation was prepared then aborted: no live
    // record remains for this transaction.
    let (_, _, salvador_reservations) = salvador.ctx.city.city_availability().await;
    assert!(salvador_reservations.iter().all(|r| r.transaction_id != status.transaction_id));

    // Ilheus never saw a PREPARE for this transaction succeed, so the
    // coordinator must not have sent it a COMMIT or ABORT either: only
    // the original occupant's PREPARE command should ever have reached
    // it, nothing for `status.transaction_id`.
    let (_, _, ilheus_reservations) = ilheus.ctx.city.city_availability().await;
    assert_eq!(ilheus_reservations.len(), 1, "no record should have been appended for the rejected transaction");
    assert_eq!(ilheus_reservations[0].transaction_id, occupant_tx);
}

/// Registry miss: the route names a city with no registry entry. Expect
/// REJECTED citing discovery failure, with the already-prepared local
/// segment aborted rather than left committed.
#[tokio::test]
async fn registry_miss_rejects_without_committing() {
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());

    let salvador = spawn_enterprise(
        "SolAtlantico",
        "Salvador",
        &["CP001"],
        &["CP001"],
        vec!["Salvador".to_string(), "Feira de Santana".to_string()],
        Arc::clone(&registry),
        Arc::clone(&ledger),
    )
    .await;

    let mut status_rx = salvador.bus().subscribe("car/reservation/status/car-4");

    let route = chosen_route(
        "car-4",
        "req-4",
        vec![
            RouteSegment { city: "Salvador".to_string(), window: elapsed_window() },
            RouteSegment { city: "Feira de Santana".to_string(), window: elapsed_window() },
        ],
    );
    let topic = format!("car/route/{}", salvador.name);
    salvador.bus().publish(&topic, serde_json::to_vec(&route).unwrap()).await;

    let status: ReservationStatusMsg = recv_json(&mut status_rx, Duration::from_secs(3)).await;
    assert_eq!(status.status, ReservationOutcome::Rejected);
    assert!(status.message.to_lowercase().contains("no participant registered"), "message was: {}", status.message);

    let (_, _, reservations) = salvador.ctx.city.city_availability().await;
    assert!(reservations.iter().all(|r| r.transaction_id != status.transaction_id), "the local prepare must have been aborted");
}

/// Worker timeout during PREPARE: the only configured worker never
/// replies. Expect `NoWorkerAvailable` after ~5s and a REJECTED status.
#[tokio::test]
async fn silent_worker_times_out_and_rejects() {
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());

    // CP001 is configured on the manager but its actor is never spawned.
    let salvador = spawn_enterprise("SolAtlantico", "Salvador", &["CP001"], &[], vec!["Salvador".to_string()], Arc::clone(&registry), Arc::clone(&ledger)).await;

    let mut status_rx = salvador.bus().subscribe("car/reservation/status/car-5");

    let route = chosen_route("car-5", "req-5", vec![RouteSegment { city: "Salvador".to_string(), window: elapsed_window() }]);
    let topic = format!("car/route/{}", salvador.name);
    salvador.bus().publish(&topic, serde_json::to_vec(&route).unwrap()).await;

    // Just over the 5s per-worker PREPARE timeout.
    let status: ReservationStatusMsg = recv_json(&mut status_rx, Duration::from_secs(7)).await;
    assert_eq!(status.status, ReservationOutcome::Rejected);
    assert!(status.message.to_lowercase().contains("no charging-point worker"), "message was: {}", status.message);
}

/// Empty chosen route: a `ChosenRoute` with no segments must be rejected
/// before any PREPARE is attempted, rather than silently proceeding to a
/// CONFIRMED status and a transaction that can never complete.
#[tokio::test]
async fn empty_chosen_route_is_rejected_without_preparing() {
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());

    let salvador = spawn_enterprise("SolAtlantico", "Salvador", &["CP001"], &["CP001"], vec!["Salvador".to_string()], Arc::clone(&registry), Arc::clone(&ledger)).await;

    let mut status_rx = salvador.bus().subscribe("car/reservation/status/car-6");

    let route = chosen_route("car-6", "req-6", vec![]);
    let topic = format!("car/route/{}", salvador.name);
    salvador.bus().publish(&topic, serde_json::to_vec(&route).unwrap()).await;

    let status: ReservationStatusMsg = recv_json(&mut status_rx, Duration::from_secs(2)).await;
    assert_eq!(status.status, ReservationOutcome::Rejected);
    assert!(status.message.to_lowercase().contains("empty"), "message was: {}", status.message);

    let (_, _, reservations) = salvador.ctx.city.city_availability().await;
    assert!(reservations.is_empty(), "no reservation should have been prepared for an empty route");
}
