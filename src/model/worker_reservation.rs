use serde::{Deserialize, Serialize};

use super::id::TransactionId;
use super::window::ReservationWindow;

/// Lifecycle of a worker's own record of a window. Mirrors
/// `ReservationStatus` one level down, at the single-post granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerReservationStatus {
    Prepared,
    Committed,
    Charged,
    Aborted,
}

impl WorkerReservationStatus {
    /// Whether a record in this status still occupies the window, and so
    /// must be checked for overlap against a new PREPARE.
    pub fn is_live(self) -> bool {
        !matches!(self, WorkerReservationStatus::Aborted | WorkerReservationStatus::Charged)
    }
}

/// A single worker's record of one reservation window.
///
/// Invariant: for any two records on the same worker whose status is in
/// `{prepared, committed}`, their windows are disjoint — enforced by
/// `ChargingPointWorker::is_available` being checked under the same
/// critical section as the append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReservation {
    pub window: ReservationWindow,
    pub transaction_id: TransactionId,
    pub status: WorkerReservationStatus,
}
