use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::bus::messages::{PrepareResponse, VehiclePassedAndCharged, WorkerCommand};
use crate::bus::MessageBus;
use crate::model::{TransactionId, WorkerId, WorkerReservation, WorkerReservationStatus};

/// Fixed cost applied to every charged window. A placeholder: real cost
/// modelling is out of scope for this engine.
pub const FIXED_UNIT_COST: f64 = 20.0;

/// How often the worker checks for elapsed committed windows.
const CHARGE_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Tombstones (aborted/charged records) are never useful for the
/// non-overlap check once terminal; beyond this bound the oldest are
/// dropped so a long-running worker doesn't grow its reservation list
/// without limit.
const MAX_TOMBSTONES: usize = 1000;

/// One physical charging post. Authoritative non-overlap oracle for its
/// own window list. Owns its state exclusively: since all mutation
/// happens inside this actor's own task loop, no mutex is needed —
/// message-passing plays the role a per-worker mutex would otherwise
/// play.
pub struct ChargingPointWorker {
    pub id: WorkerId,
    reservations: Vec<WorkerReservation>,
    enterprise_name: String,
    bus: Arc<dyn MessageBus>,
}

impl ChargingPointWorker {
    pub fn new(id: WorkerId, enterprise_name: String, bus: Arc<dyn MessageBus>) -> Self {
        Self { id, reservations: Vec::new(), enterprise_name, bus }
    }

    fn command_topic(enterprise_name: &str, worker_id: &WorkerId) -> String {
        format!("enterprise/{}/cp/{}/command", enterprise_name, worker_id)
    }

    fn event_topic(enterprise_name: &str, worker_id: &WorkerId) -> String {
        format!("enterprise/{}/cp/{}/event", enterprise_name, worker_id)
    }

    /// Availability test: holds iff no record with a live status
    /// intersects the candidate window.
    fn is_available(&self, window: &crate::model::ReservationWindow) -> bool {
        self.reservations.iter().all(|r| !r.status.is_live() || !r.window.overlaps(window))
    }

    /// Critical-section contract: the availability test and the append
    /// happen as one call with no `.await` between them, so two
    /// concurrent PREPAREs on the same worker can never both observe
    /// availability for overlapping windows.
    fn handle_prepare(&mut self, window: crate::model::ReservationWindow, transaction_id: TransactionId) -> bool {
        let available = self.is_available(&window);
        if available {
            self.reservations.push(WorkerReservation { window, transaction_id, status: WorkerReservationStatus::Prepared });
        }
        available
    }

    fn handle_commit(&mut self, transaction_id: &TransactionId) {
        let mut any = false;
        for r in self.reservations.iter_mut() {
            if &r.transaction_id == transaction_id && r.status == WorkerReservationStatus::Prepared {
                r.status = WorkerReservationStatus::Committed;
                any = true;
            }
        }
        if !any {
            log::warn!("worker {}: COMMIT for unknown/non-prepared transaction {}", self.id, transaction_id);
        }
    }

    fn handle_abort(&mut self, transaction_id: &TransactionId) {
        let mut any = false;
        for r in self.reservations.iter_mut() {
            if &r.transaction_id == transaction_id && r.status == WorkerReservationStatus::Prepared {
                // Tombstoned, not removed, to avoid reuse hazards.
                r.status = WorkerReservationStatus::Aborted;
                any = true;
            }
        }
        if !any {
            log::warn!("worker {}: ABORT for unknown/non-prepared transaction {}", self.id, transaction_id);
        }
    }

    fn evict_old_tombstones(&mut self) {
        let terminal = self.reservations.iter().filter(|r| !r.status.is_live()).count();
        if terminal <= MAX_TOMBSTONES {
            return;
        }
        let mut to_drop = terminal - MAX_TOMBSTONES;
        self.reservations.retain(|r| {
            if to_drop > 0 && !r.status.is_live() {
                to_drop -= 1;
                false
            } else {
                true
            }
        });
    }

    /// For every committed record whose window has elapsed, charge the
    /// fixed unit cost and emit `VEHICLE_PASSED_AND_CHARGED`.
    async fn run_charge_tick(&mut self) {
        let now = Utc::now();
        let mut charged = Vec::new();
        for r in self.reservations.iter_mut() {
            if r.status == WorkerReservationStatus::Committed && r.window.has_elapsed(now) {
                r.status = WorkerReservationStatus::Charged;
                charged.push(VehiclePassedAndCharged {
                    transaction_id: r.transaction_id.clone(),
                    cost: FIXED_UNIT_COST,
                    window: r.window,
                    worker_id: self.id.clone(),
                });
            }
        }
        self.evict_old_tombstones();

        for event in charged {
            let topic = Self::event_topic(&self.enterprise_name, &self.id);
            let payload = serde_json::to_vec(&event).expect("VehiclePassedAndCharged always serializes");
            self.bus.publish(&topic, payload).await;
            log::info!("worker {}: charged transaction {} ({:.2})", self.id, event.transaction_id, event.cost);
        }
    }

    async fn handle_command_payload(&mut self, payload: &[u8]) {
        let command: WorkerCommand = match serde_json::from_slice(payload) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("worker {}: dropping malformed command: {}", self.id, e);
                return;
            }
        };

        match command {
            WorkerCommand::PrepareReserveWindow { window, transaction_id, response_topic } => {
                if response_topic.is_empty() {
                    log::warn!("worker {}: PREPARE without response_topic, dropping (protocol error)", self.id);
                    return;
                }
                let success = self.handle_prepare(window, transaction_id.clone());
                let response = PrepareResponse { success, transaction_id, worker_id: self.id.clone() };
                let bytes = serde_json::to_vec(&response).expect("PrepareResponse always serializes");
                self.bus.publish(&response_topic, bytes).await;
            }
            WorkerCommand::Commit { transaction_id } => self.handle_commit(&transaction_id),
            WorkerCommand::Abort { transaction_id } => self.handle_abort(&transaction_id),
        }
    }

    /// Runs the worker's actor loop until the command channel closes.
    /// Spawn with `tokio::spawn(worker.run())`.
    pub async fn run(mut self) {
        let command_topic = Self::command_topic(&self.enterprise_name, &self.id);
        let mut commands = self.bus.subscribe(&command_topic);
        let mut ticker = tokio::time::interval(CHARGE_TICK_INTERVAL);

        log::info!("worker {} listening on {}", self.id, command_topic);

        loop {
            tokio::select! {
                received = commands.recv() => {
                    match received {
                        Ok(payload) => self.handle_command_payload(&payload).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("worker {}: lagged, dropped {} command(s)", self.id, n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = ticker.tick() => {
                    self.run_charge_tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::model::ReservationWindow;
    use chrono::Duration as ChronoDuration;

    fn window(offset_secs: i64, len_secs: i64) -> ReservationWindow {
        let start = Utc::now() + ChronoDuration::seconds(offset_secs);
        ReservationWindow::new(start, start + ChronoDuration::seconds(len_secs))
    }

    #[test]
    fn non_overlapping_prepares_both_succeed() {
        let bus = Arc::new(LocalBus::new());
        let mut worker = ChargingPointWorker::new(WorkerId::new("CP001"), "Acme".into(), bus);

        let tx1 = TransactionId::generate();
        let tx2 = TransactionId::generate();

        assert!(worker.handle_prepare(window(0, 60), tx1));
        assert!(worker.handle_prepare(window(120, 60), tx2));
    }

    #[test]
    fn overlapping_prepare_is_rejected() {
        let bus = Arc::new(LocalBus::new());
        let mut worker = ChargingPointWorker::new(WorkerId::new("CP001"), "Acme".into(), bus);

        let tx1 = TransactionId::generate();
        let tx2 = TransactionId::generate();

        assert!(worker.handle_prepare(window(0, 120), tx1));
        assert!(!worker.handle_prepare(window(60, 60), tx2));
    }

    #[test]
    fn aborted_window_frees_the_slot() {
        let bus = Arc::new(LocalBus::new());
        let mut worker = ChargingPointWorker::new(WorkerId::new("CP001"), "Acme".into(), bus);

        let tx1 = TransactionId::generate();
        let tx2 = TransactionId::generate();

        assert!(worker.handle_prepare(window(0, 120), tx1.clone()));
        worker.handle_abort(&tx1);
        assert!(worker.handle_prepare(window(30, 60), tx2));
    }

    #[test]
    fn commit_then_abort_on_same_transaction_is_a_noop_after_commit() {
        let bus = Arc::new(LocalBus::new());
        let mut worker = ChargingPointWorker::new(WorkerId::new("CP001"), "Acme".into(), bus);

        let tx1 = TransactionId::generate();
        assert!(worker.handle_prepare(window(0, 60), tx1.clone()));
        worker.handle_commit(&tx1);
        assert_eq!(worker.reservations[0].status, WorkerReservationStatus::Committed);

        // duplicate commit is idempotent
        worker.handle_commit(&tx1);
        assert_eq!(worker.reservations[0].status, WorkerReservationStatus::Committed);

        // abort after commit does nothing: only PREPARED records abort
        worker.handle_abort(&tx1);
        assert_eq!(worker.reservations[0].status, WorkerReservationStatus::Committed);
    }
}
