use std::sync::Arc;

use crate::bus::messages::{RouteRequest, RouteReservationOptions};
use crate::instance::EnterpriseContext;

/// Consumes `RouteRequest` on `car/route_request/<enterprise>`, asks the
/// configured `RouteProvider` for candidate routes, and emits
/// `RouteReservationOptions` back to the requesting vehicle.
pub struct RouteOptionsHandler {
    ctx: EnterpriseContext,
}

impl RouteOptionsHandler {
    pub fn new(ctx: EnterpriseContext) -> Self {
        Self { ctx }
    }

    fn handle_request(&self, request: RouteRequest) -> Option<(String, RouteReservationOptions)> {
        if request.vehicle_id.is_empty() || request.origin.is_empty() || request.destination.is_empty() {
            log::warn!("route handler: dropping request with empty vehicle_id/origin/destination");
            return None;
        }

        let routes = self.ctx.route_provider.generate_possible_routes(&request.origin, &request.destination);
        let options = RouteReservationOptions {
            request_id: uuid::Uuid::new_v4().to_string(),
            vehicle_id: request.vehicle_id.clone(),
            routes,
        };
        Some((request.vehicle_id, options))
    }

    /// Subscribes to `car/route_request/<enterprise>` and handles each
    /// incoming request in turn, bounded by the bus's own buffer.
    pub async fn run(self: Arc<Self>) {
        let topic = format!("car/route_request/{}", self.ctx.enterprise_name);
        let mut requests = self.ctx.bus.subscribe(&topic);
        log::info!("route handler listening on {}", topic);

        loop {
            match requests.recv().await {
                Ok(payload) => {
                    let request: RouteRequest = match serde_json::from_slice(&payload) {
                        Ok(r) => r,
                        Err(e) => {
                            log::warn!("route handler: dropping malformed RouteRequest: {}", e);
                            continue;
                        }
                    };
                    if let Some((vehicle_id, options)) = self.handle_request(request) {
                        let bytes = serde_json::to_vec(&options).expect("RouteReservationOptions always serializes");
                        self.ctx.bus.publish(&vehicle_id, bytes).await;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("route handler: lagged, dropped {} request(s)", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
