use std::sync::Arc;

use ev_route_reservation::bus::{LocalBus, MessageBus};
use ev_route_reservation::city::CityStateManager;
use ev_route_reservation::config::Config;
use ev_route_reservation::coordinator::ReservationCoordinator;
use ev_route_reservation::http::server::{self, AppState};
use ev_route_reservation::instance::EnterpriseContext;
use ev_route_reservation::ledger::Ledger;
use ev_route_reservation::registry::{HttpRegistryClient, Registry};
use ev_route_reservation::routing::{DfsRouteProvider, RouteProvider};
use ev_route_reservation::route_handler::RouteOptionsHandler;
use ev_route_reservation::worker::ChargingPointWorker;
use ev_route_reservation::{ledger, logger};
use ev_route_reservation::model::WorkerId;

#[tokio::main]
async fn main() {
    logger::init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "starting enterprise '{}' on port {}, managing city '{}' with {} post(s)",
        config.enterprise_name,
        config.enterprise_port,
        config.owned_city,
        config.cp_worker_ids.len()
    );

    let my_api_url = config.my_api_url();
    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
    let registry: Arc<dyn Registry> = Arc::new(HttpRegistryClient::new(config.registry_url.clone()));
    let ledger: Arc<dyn Ledger> = Arc::new(ledger::InMemoryLedger::new());
    let route_provider: Arc<dyn RouteProvider> = Arc::new(DfsRouteProvider::new(config.known_cities.clone()));

    let worker_ids: Vec<WorkerId> = config.cp_worker_ids.iter().map(|id| WorkerId::new(id.clone())).collect();

    let city = Arc::new(CityStateManager::new(config.owned_city.clone(), config.enterprise_name.clone(), my_api_url.clone(), worker_ids.clone(), Arc::clone(&bus)));

    let ctx = EnterpriseContext::new(config.enterprise_name.clone(), my_api_url.clone(), Arc::clone(&city), Arc::clone(&bus), registry, ledger, route_provider);

    if let Err(e) = ctx.registry.register(&config.owned_city, &my_api_url, &config.enterprise_name).await {
        log::error!("[{}] failed to register with registry: {}", config.enterprise_name, e);
    } else {
        log::info!("[{}] registered as manager of '{}' at {}", config.enterprise_name, config.owned_city, my_api_url);
    }

    for worker_id in &worker_ids {
        let worker = ChargingPointWorker::new(worker_id.clone(), config.enterprise_name.clone(), Arc::clone(&bus));
        tokio::spawn(worker.run());
    }

    let coordinator = Arc::new(ReservationCoordinator::new(ctx.clone()));
    tokio::spawn(Arc::clone(&coordinator).run_chosen_route_dispatcher());
    for worker_id in &worker_ids {
        tokio::spawn(Arc::clone(&coordinator).run_worker_event_listener(worker_id.clone()));
    }

    let route_handler = Arc::new(RouteOptionsHandler::new(ctx.clone()));
    tokio::spawn(route_handler.run());

    let app_state = AppState { ctx, coordinator };
    let app = server::router(app_state);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.enterprise_port)).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to bind port {}: {}", config.enterprise_port, e);
            std::process::exit(1);
        }
    };

    log::info!("[{}] HTTP surface listening on port {}", config.enterprise_name, config.enterprise_port);

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("HTTP server error: {}", e);
    }
}
