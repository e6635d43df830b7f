use std::sync::Arc;
use std::time::Duration;

use crate::bus::messages::{ChosenRoute, JourneyFinished, ReservationOutcome, ReservationStatusMsg, VehiclePassedAndCharged};
use crate::http::client::RemoteParticipantClient;
use crate::http::dto::{RemoteOutcome, RemotePrepareRequest};
use crate::instance::EnterpriseContext;
use crate::model::{ReservationStatus, Route, TransactionId, VehicleId, WorkerId};

/// Remote PREPARE timeout, matching the Go reference's
/// `http.Client{Timeout: time.Second * 10}`.
const REMOTE_PREPARE_TIMEOUT: Duration = Duration::from_secs(10);

enum PreparedParticipant {
    Local,
    Remote { city: String, api_url: String },
}

/// Orchestrates a chosen route into an all-or-nothing reservation, then
/// tracks per-segment completion through to journey finalization.
pub struct ReservationCoordinator {
    ctx: EnterpriseContext,
    http: RemoteParticipantClient,
}

impl ReservationCoordinator {
    pub fn new(ctx: EnterpriseContext) -> Self {
        Self { ctx, http: RemoteParticipantClient::new(REMOTE_PREPARE_TIMEOUT) }
    }

    fn log_ctx(&self, transaction_id: &TransactionId) -> String {
        crate::logger::tx_ctx(&self.ctx.enterprise_name, &transaction_id.to_string())
    }

    /// Subscribes to `car/route/<enterprise>` and spawns one task per
    /// `ChosenRoute` message — each is long-running since its prepare
    /// phase blocks on network and worker round-trips.
    pub async fn run_chosen_route_dispatcher(self: Arc<Self>) {
        let topic = format!("car/route/{}", self.ctx.enterprise_name);
        let mut messages = self.ctx.bus.subscribe(&topic);
        log::info!("coordinator listening on {}", topic);

        loop {
            match messages.recv().await {
                Ok(payload) => {
                    let chosen: ChosenRoute = match serde_json::from_slice(&payload) {
                        Ok(c) => c,
                        Err(e) => {
                            log::warn!("coordinator: dropping malformed ChosenRoute: {}", e);
                            continue;
                        }
                    };
                    let coordinator = Arc::clone(&self);
                    tokio::spawn(async move { coordinator.handle_chosen_route(chosen).await });
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("coordinator: lagged, dropped {} chosen-route message(s)", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Subscribes to one worker's event topic and feeds charge events into
    /// completion aggregation.
    pub async fn run_worker_event_listener(self: Arc<Self>, worker_id: WorkerId) {
        let topic = format!("enterprise/{}/cp/{}/event", self.ctx.enterprise_name, worker_id);
        let mut events = self.ctx.bus.subscribe(&topic);
        log::info!("coordinator listening for charge events on {}", topic);

        loop {
            match events.recv().await {
                Ok(payload) => {
                    let event: VehiclePassedAndCharged = match serde_json::from_slice(&payload) {
                        Ok(e) => e,
                        Err(e) => {
                            log::warn!("coordinator: dropping malformed charge event: {}", e);
                            continue;
                        }
                    };
                    self.handle_worker_event(event).await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("coordinator: lagged, dropped {} charge event(s)", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pub async fn handle_chosen_route(&self, chosen: ChosenRoute) {
        let transaction_id = TransactionId::generate();

        if chosen.vehicle_id.is_empty() || chosen.request_id.is_empty() {
            log::warn!("{}: dropping ChosenRoute with missing vehicle_id or request_id", self.log_ctx(&transaction_id));
            return;
        }

        let vehicle_id = VehicleId::new(chosen.vehicle_id.clone());
        let request_id = crate::model::RequestId::new(chosen.request_id.clone());
        let route: Route = chosen.route.clone();

        if route.is_empty() {
            log::warn!("{}: chosen route was empty for vehicle {}", self.log_ctx(&transaction_id), vehicle_id);
            self.publish_status(&transaction_id, &vehicle_id, &request_id, ReservationOutcome::Rejected, "chosen route was empty".to_string(), None).await;
            return;
        }

        log::info!("{}: starting 2PC for vehicle {} over {} segment(s)", self.log_ctx(&transaction_id), vehicle_id, route.len());

        let mut prepared: Vec<PreparedParticipant> = Vec::new();
        let mut failure_reason: Option<String> = None;

        for segment in &route {
            if segment.city == self.ctx.owned_city() {
                match self
                    .ctx
                    .city
                    .prepare_reservation(transaction_id.clone(), vehicle_id.clone(), request_id.clone(), segment.window, None)
                    .await
                {
                    Ok(()) => prepared.push(PreparedParticipant::Local),
                    Err(e) => {
                        failure_reason = Some(e.to_string());
                        break;
                    }
                }
            } else {
                match self.prepare_remote(&transaction_id, &vehicle_id, &request_id, &segment.city, segment.window).await {
                    Ok(api_url) => prepared.push(PreparedParticipant::Remote { city: segment.city.clone(), api_url }),
                    Err(reason) => {
                        failure_reason = Some(reason);
                        break;
                    }
                }
            }
        }

        if let Some(reason) = failure_reason {
            log::warn!("{}: prepare phase failed: {}", self.log_ctx(&transaction_id), reason);
            self.abort_all(&transaction_id, &prepared).await;
            self.publish_status(&transaction_id, &vehicle_id, &request_id, ReservationOutcome::Rejected, reason, None).await;
            return;
        }

        self.commit_all(&transaction_id, &prepared).await;

        if let Err(e) = self.ctx.ledger.register_reserve(transaction_id.as_str(), vehicle_id.as_str(), &route).await {
            log::warn!("{}: ledger RegisterReserve failed: {}", self.log_ctx(&transaction_id), e);
        }
        if let Err(e) = self.ctx.ledger.start_charging(transaction_id.as_str()).await {
            log::warn!("{}: ledger StartCharging failed: {}", self.log_ctx(&transaction_id), e);
        }

        self.ctx.city.start_coordinating_transaction(transaction_id.clone(), vehicle_id.clone(), &route).await;

        self.publish_status(&transaction_id, &vehicle_id, &request_id, ReservationOutcome::Confirmed, "reservation confirmed".to_string(), Some(route)).await;
        log::info!("{}: CONFIRMED", self.log_ctx(&transaction_id));
    }

    async fn prepare_remote(
        &self,
        transaction_id: &TransactionId,
        vehicle_id: &VehicleId,
        request_id: &crate::model::RequestId,
        city: &str,
        window: crate::model::ReservationWindow,
    ) -> std::result::Result<String, String> {
        let participant = match self.ctx.registry.discover(city).await {
            Ok(Some(p)) => p,
            Ok(None) => return Err(format!("no participant registered for city '{}'", city)),
            Err(e) => return Err(e.to_string()),
        };

        let request = RemotePrepareRequest {
            transaction_id: transaction_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            request_id: request_id.to_string(),
            city: city.to_string(),
            window,
            coordinator_url: self.ctx.api_url.to_string(),
        };

        match self.http.prepare(&participant.api_url, &request).await {
            Ok(response) if response.status == RemoteOutcome::Prepared => Ok(participant.api_url),
            Ok(response) => Err(response.reason.unwrap_or_else(|| format!("{} rejected the reservation", city))),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn commit_all(&self, transaction_id: &TransactionId, prepared: &[PreparedParticipant]) {
        for participant in prepared {
            match participant {
                PreparedParticipant::Local => self.ctx.city.commit_reservation(transaction_id).await,
                PreparedParticipant::Remote { api_url, .. } => {
                    if let Err(e) = self.http.commit(api_url, transaction_id.as_str()).await {
                        log::warn!("{}: remote COMMIT to {} failed: {}", self.log_ctx(transaction_id), api_url, e);
                    }
                }
            }
        }
    }

    async fn abort_all(&self, transaction_id: &TransactionId, prepared: &[PreparedParticipant]) {
        for participant in prepared {
            match participant {
                PreparedParticipant::Local => self.ctx.city.abort_reservation(transaction_id).await,
                PreparedParticipant::Remote { api_url, .. } => {
                    if let Err(e) = self.http.abort(api_url, transaction_id.as_str()).await {
                        log::warn!("{}: remote ABORT to {} failed: {}", self.log_ctx(transaction_id), api_url, e);
                    }
                }
            }
        }
    }

    async fn publish_status(
        &self,
        transaction_id: &TransactionId,
        vehicle_id: &VehicleId,
        request_id: &crate::model::RequestId,
        status: ReservationOutcome,
        message: String,
        confirmed_route: Option<Route>,
    ) {
        let topic = format!("car/reservation/status/{}", vehicle_id);
        let status_msg = ReservationStatusMsg {
            transaction_id: transaction_id.clone(),
            vehicle_id: vehicle_id.clone(),
            request_id: request_id.clone(),
            status,
            message,
            confirmed_route,
        };
        let payload = serde_json::to_vec(&status_msg).expect("ReservationStatusMsg always serializes");
        self.ctx.bus.publish(&topic, payload).await;
    }

    /// Entry point for a worker's `VEHICLE_PASSED_AND_CHARGED` event: marks
    /// the local reservation CHARGED, then routes the segment-completion
    /// report to wherever the coordinator for this transaction lives.
    async fn handle_worker_event(&self, event: VehiclePassedAndCharged) {
        self.ctx.city.finalize_reservation(&event.transaction_id, ReservationStatus::Charged).await;

        if self.ctx.city.is_coordinator(&event.transaction_id).await {
            self.record_segment_completion_and_maybe_finalize(&event.transaction_id, self.ctx.owned_city(), event.cost).await;
            return;
        }

        match self.ctx.city.get_coordinator_url(&event.transaction_id).await {
            Some(coordinator_url) => {
                if let Err(e) = self
                    .http
                    .report_segment_completion(&coordinator_url, event.transaction_id.as_str(), self.ctx.owned_city(), event.cost)
                    .await
                {
                    log::warn!("{}: reporting segment completion to {} failed: {}", self.log_ctx(&event.transaction_id), coordinator_url, e);
                }
            }
            None => log::warn!("{}: charged but no coordinator_url on file", self.log_ctx(&event.transaction_id)),
        }
    }

    /// Invoked directly by the `/report-segment-completion` HTTP handler
    /// when this instance is the coordinator for `transaction_id`.
    pub async fn handle_segment_completion_report(&self, transaction_id: &str, segment_city: &str, cost: f64) {
        let tx_id = TransactionId::new(transaction_id.to_string());
        self.record_segment_completion_and_maybe_finalize(&tx_id, segment_city, cost).await;
    }

    async fn record_segment_completion_and_maybe_finalize(&self, transaction_id: &TransactionId, segment_city: &str, cost: f64) {
        let Some((all_done, total_cost)) = self.ctx.city.record_segment_completion(transaction_id, segment_city, cost).await else {
            log::warn!("{}: segment completion reported for a transaction this instance isn't coordinating", self.log_ctx(transaction_id));
            return;
        };

        if !all_done {
            return;
        }

        let cost_str = format!("{:.2}", total_cost);
        if let Err(e) = self.ctx.ledger.end_charging(transaction_id.as_str(), &cost_str, "0.0").await {
            log::warn!("{}: ledger EndCharging failed: {}", self.log_ctx(transaction_id), e);
        }

        let vehicle_id = self.ctx.city.get_vehicle_id_for_transaction(transaction_id).await;
        match vehicle_id {
            Some(vehicle_id) => {
                let topic = format!("car/journey/finished/{}", vehicle_id);
                let finished = JourneyFinished {
                    status: "completed".to_string(),
                    transaction_id: transaction_id.clone(),
                    message: format!("journey completed, total cost {}", cost_str),
                };
                let payload = serde_json::to_vec(&finished).expect("JourneyFinished always serializes");
                self.ctx.bus.publish(&topic, payload).await;
                log::info!("{}: journey finished, total cost {}", self.log_ctx(transaction_id), cost_str);
            }
            None => log::warn!("{}: completed but no vehicle_id on file to notify", self.log_ctx(transaction_id)),
        }
    }
}
