//! Shared harness for the end-to-end two-phase-commit scenarios below.
//!
//! Each "enterprise" here is the same wiring `main.rs` does: its own
//! `LocalBus`, a `CityStateManager` for one city, zero or more running
//! `ChargingPointWorker` actors, a `ReservationCoordinator`, and a real
//! axum HTTP server bound to an ephemeral localhost port — so
//! cross-enterprise 2PC goes over an actual TCP round-trip, just like in
//! production, while the bus and broker stay in-process.

use std::sync::Arc;
use std::time::Duration;

use ev_route_reservation::bus::{LocalBus, MessageBus};
use ev_route_reservation::city::CityStateManager;
use ev_route_reservation::coordinator::ReservationCoordinator;
use ev_route_reservation::http::server::{self, AppState};
use ev_route_reservation::instance::EnterpriseContext;
use ev_route_reservation::ledger::Ledger;
use ev_route_reservation::model::WorkerId;
use ev_route_reservation::registry::Registry;
use ev_route_reservation::routing::{DfsRouteProvider, RouteProvider};
use ev_route_reservation::worker::ChargingPointWorker;

pub struct Enterprise {
    pub name: String,
    pub ctx: EnterpriseContext,
    pub coordinator: Arc<ReservationCoordinator>,
    pub api_url: String,
}

impl Enterprise {
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.ctx.bus
    }
}

/// Boots one enterprise instance and spawns its background tasks (worker
/// actors, 2PC dispatcher, worker-event listener, HTTP server), mirroring
/// `main.rs`. `running_workers` lets a test configure a worker id on the
/// manager without actually starting its actor, to exercise the "silent
/// worker" timeout case.
pub async fn spawn_enterprise(
    name: &str,
    owned_city: &str,
    worker_ids: &[&str],
    running_workers: &[&str],
    known_cities: Vec<String>,
    registry: Arc<dyn Registry>,
    ledger: Arc<dyn Ledger>,
) -> Enterprise {
    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener has a local address");
    let api_url = format!("http://{}", addr);

    let worker_ids: Vec<WorkerId> = worker_ids.iter().map(|id| WorkerId::new(*id)).collect();
    let city = Arc::new(CityStateManager::new(owned_city.to_string(), name.to_string(), api_url.clone(), worker_ids.clone(), Arc::clone(&bus)));
    let route_provider: Arc<dyn RouteProvider> = Arc::new(DfsRouteProvider::new(known_cities));

    let ctx = EnterpriseContext::new(name.to_string(), api_url.clone(), Arc::clone(&city), Arc::clone(&bus), Arc::clone(&registry), Arc::clone(&ledger), route_provider);

    registry.register(owned_city, &api_url, name).await.expect("registry register succeeds");

    for worker_id in &worker_ids {
        if running_workers.contains(&worker_id.as_str()) {
            let worker = ChargingPointWorker::new(worker_id.clone(), name.to_string(), Arc::clone(&bus));
            tokio::spawn(worker.run());
        }
    }

    let coordinator = Arc::new(ReservationCoordinator::new(ctx.clone()));
    tokio::spawn(Arc::clone(&coordinator).run_chosen_route_dispatcher());
    for worker_id in &worker_ids {
        tokio::spawn(Arc::clone(&coordinator).run_worker_event_listener(worker_id.clone()));
    }

    let app_state = AppState { ctx: ctx.clone(), coordinator: Arc::clone(&coordinator) };
    let app = server::router(app_state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    // Give the HTTP server's accept loop a moment to start listening
    // before any test issues a request against `api_url`.
    tokio::time::sleep(Duration::from_millis(20)).await;

    Enterprise { name: name.to_string(), ctx, coordinator, api_url }
}

/// Waits up to `timeout` for the next message on `rx`, decoded as `T`.
pub async fn recv_json<T: serde::de::DeserializeOwned>(rx: &mut tokio::sync::broadcast::Receiver<Vec<u8>>, timeout: Duration) -> T {
    let payload = tokio::time::timeout(timeout, rx.recv())
        .await
        .expect("message arrives within timeout")
        .expect("channel is not closed");
    serde_json::from_slice(&payload).expect("payload decodes as expected type")
}
