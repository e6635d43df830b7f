use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::bus::messages::{PrepareResponse, WorkerCommand};
use crate::bus::MessageBus;
use crate::error::{Error, Result};
use crate::model::{Reservation, ReservationStatus, ReservationWindow, Route, RequestId, TransactionId, TransactionProgress, VehicleId, WorkerId};

/// How long a PREPARE attempt against one worker waits for a reply before
/// moving on to the next.
const WORKER_PREPARE_TIMEOUT: Duration = Duration::from_secs(5);

struct CityState {
    reservations: Vec<Reservation>,
    transactions: HashMap<TransactionId, TransactionProgress>,
}

/// Runs two-phase commit for the single city it owns, across its
/// configured pool of workers. One exclusive lock guards both the
/// reservation list and the transaction-progress map; PREPARE holds it
/// across the worker round-trip so the availability decision is atomic
/// with the record append.
pub struct CityStateManager {
    owned_city: String,
    enterprise_name: String,
    my_api_url: String,
    worker_ids: Vec<WorkerId>,
    bus: Arc<dyn MessageBus>,
    state: Mutex<CityState>,
}

impl CityStateManager {
    pub fn new(owned_city: String, enterprise_name: String, my_api_url: String, worker_ids: Vec<WorkerId>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            owned_city,
            enterprise_name,
            my_api_url,
            worker_ids,
            bus,
            state: Mutex::new(CityState { reservations: Vec::new(), transactions: HashMap::new() }),
        }
    }

    pub fn owned_city(&self) -> &str {
        &self.owned_city
    }

    pub fn my_api_url(&self) -> &str {
        &self.my_api_url
    }

    fn worker_command_topic(&self, worker_id: &WorkerId) -> String {
        format!("enterprise/{}/cp/{}/command", self.enterprise_name, worker_id)
    }

    fn worker_response_topic(&self, worker_id: &WorkerId) -> String {
        format!("enterprise/{}/cp/{}/response/{}", self.enterprise_name, worker_id, uuid::Uuid::new_v4())
    }

    /// Tries each configured worker in order; the first to reply success
    /// wins. Workers replying failure or timing out are skipped.
    async fn attempt_to_prepare_worker(&self, transaction_id: &TransactionId, window: ReservationWindow) -> Result<WorkerId> {
        for worker_id in &self.worker_ids {
            let response_topic = self.worker_response_topic(worker_id);
            let command = WorkerCommand::PrepareReserveWindow {
                window,
                transaction_id: transaction_id.clone(),
                response_topic: response_topic.clone(),
            };
            let payload = serde_json::to_vec(&command).expect("WorkerCommand always serializes");

            // Register the correlation before publishing: otherwise a
            // worker fast enough to reply before we start waiting would
            // have its reply silently dropped (the response topic is
            // single-reader, not a queue).
            let reply = self.bus.register_reply(&response_topic);
            self.bus.publish(&self.worker_command_topic(worker_id), payload).await;

            match reply.wait(WORKER_PREPARE_TIMEOUT).await {
                Some(bytes) => match serde_json::from_slice::<PrepareResponse>(&bytes) {
                    Ok(resp) if resp.success => {
                        log::info!("{}: worker {} prepared for {}", self.log_ctx(transaction_id), worker_id, transaction_id);
                        return Ok(worker_id.clone());
                    }
                    Ok(_) => log::info!("{}: worker {} declined (conflict)", self.log_ctx(transaction_id), worker_id),
                    Err(e) => log::warn!("{}: could not decode reply from {}: {}", self.log_ctx(transaction_id), worker_id, e),
                },
                None => log::warn!("{}: timed out waiting for worker {}", self.log_ctx(transaction_id), worker_id),
            }
        }
        Err(Error::NoWorkerAvailable)
    }

    fn log_ctx(&self, transaction_id: &TransactionId) -> String {
        crate::logger::tx_ctx(&self.enterprise_name, &transaction_id.to_string())
    }

    /// Idempotent: a PREPARED reservation already on file for `tx_id`
    /// short-circuits to success without touching any worker. The lock is
    /// acquired once and held across the idempotency check, the worker
    /// round-trip, and the record append — not dropped and re-acquired
    /// in between — so two concurrent PREPARE deliveries for the same
    /// `transaction_id` can never both pass the idempotency check and
    /// both append a record.
    pub async fn prepare_reservation(
        &self,
        transaction_id: TransactionId,
        vehicle_id: VehicleId,
        request_id: RequestId,
        window: ReservationWindow,
        coordinator_url: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.reservations.iter().any(|r| r.transaction_id == transaction_id && r.status == ReservationStatus::Prepared) {
            log::info!("{}: already prepared locally, treating as success", self.log_ctx(&transaction_id));
            return Ok(());
        }

        let worker_id = self.attempt_to_prepare_worker(&transaction_id, window).await?;

        state.reservations.push(Reservation {
            transaction_id: transaction_id.clone(),
            vehicle_id,
            request_id,
            city: self.owned_city.clone(),
            window,
            status: ReservationStatus::Prepared,
            coordinator_url,
            worker_id: Some(worker_id),
        });
        Ok(())
    }

    pub async fn commit_reservation(&self, transaction_id: &TransactionId) {
        let mut state = self.state.lock().await;
        let mut found = false;
        let mut worker_to_notify = None;
        for r in state.reservations.iter_mut() {
            if &r.transaction_id == transaction_id && r.status == ReservationStatus::Prepared {
                r.status = ReservationStatus::Committed;
                worker_to_notify = r.worker_id.clone();
                found = true;
            }
        }
        drop(state);

        if let Some(worker_id) = worker_to_notify {
            let command = WorkerCommand::Commit { transaction_id: transaction_id.clone() };
            let payload = serde_json::to_vec(&command).expect("WorkerCommand always serializes");
            self.bus.publish(&self.worker_command_topic(&worker_id), payload).await;
        }
        if !found {
            log::warn!("{}: COMMIT for unknown/non-prepared reservation", self.log_ctx(transaction_id));
        }
    }

    pub async fn abort_reservation(&self, transaction_id: &TransactionId) {
        let mut state = self.state.lock().await;
        let mut worker_to_notify = None;
        let before = state.reservations.len();
        let tx = transaction_id.clone();
        state.reservations.retain(|r| {
            if r.transaction_id == tx && r.status == ReservationStatus::Prepared {
                worker_to_notify = r.worker_id.clone();
                false
            } else {
                true
            }
        });
        let aborted = state.reservations.len() != before;
        drop(state);

        if let Some(worker_id) = worker_to_notify {
            let command = WorkerCommand::Abort { transaction_id: transaction_id.clone() };
            let payload = serde_json::to_vec(&command).expect("WorkerCommand always serializes");
            self.bus.publish(&self.worker_command_topic(&worker_id), payload).await;
        }
        if !aborted {
            log::warn!("{}: ABORT for unknown/non-prepared reservation", self.log_ctx(transaction_id));
        }
    }

    /// Sets a reservation's status to a terminal value once the worker's
    /// charge event arrives.
    pub async fn finalize_reservation(&self, transaction_id: &TransactionId, final_status: ReservationStatus) {
        let mut state = self.state.lock().await;
        for r in state.reservations.iter_mut() {
            if &r.transaction_id == transaction_id {
                r.status = final_status;
            }
        }
    }

    pub async fn is_coordinator(&self, transaction_id: &TransactionId) -> bool {
        let state = self.state.lock().await;
        state
            .reservations
            .iter()
            .find(|r| &r.transaction_id == transaction_id)
            .map(|r| r.coordinator_url.is_none() || r.coordinator_url.as_deref() == Some(self.my_api_url.as_str()))
            .unwrap_or(false)
    }

    pub async fn get_coordinator_url(&self, transaction_id: &TransactionId) -> Option<String> {
        let state = self.state.lock().await;
        state.reservations.iter().find(|r| &r.transaction_id == transaction_id).and_then(|r| r.coordinator_url.clone())
    }

    pub async fn get_vehicle_id_for_transaction(&self, transaction_id: &TransactionId) -> Option<VehicleId> {
        let state = self.state.lock().await;
        if let Some(progress) = state.transactions.get(transaction_id) {
            return Some(progress.vehicle_id.clone());
        }
        state.reservations.iter().find(|r| &r.transaction_id == transaction_id).map(|r| r.vehicle_id.clone())
    }

    pub async fn start_coordinating_transaction(&self, transaction_id: TransactionId, vehicle_id: VehicleId, route: &Route) {
        let mut state = self.state.lock().await;
        state.transactions.insert(transaction_id.clone(), TransactionProgress::new(transaction_id, vehicle_id, route));
    }

    /// Idempotent per segment city. Returns `(all_done, total_cost)`, or
    /// `None` if this manager isn't tracking `transaction_id` (it isn't
    /// the coordinator, or the transaction is unknown).
    pub async fn record_segment_completion(&self, transaction_id: &TransactionId, segment_city: &str, cost: f64) -> Option<(bool, f64)> {
        let mut state = self.state.lock().await;
        let progress = state.transactions.get_mut(transaction_id)?;
        let result = progress.record_segment(segment_city, cost);
        if result.0 {
            state.transactions.remove(transaction_id);
        }
        Some(result)
    }

    /// Backing data for the `/status` diagnostic endpoint.
    pub async fn city_availability(&self) -> (String, usize, Vec<Reservation>) {
        let state = self.state.lock().await;
        (self.owned_city.clone(), self.worker_ids.len(), state.reservations.clone())
    }
}
