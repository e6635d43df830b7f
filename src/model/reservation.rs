use serde::{Deserialize, Serialize};

use super::id::{RequestId, TransactionId, VehicleId, WorkerId};
use super::window::ReservationWindow;

/// Lifecycle of a per-city reservation record.
///
/// Transitions are monotone: `PREPARED -> COMMITTED -> CHARGED`, with
/// `PREPARED -> ABORTED` as the only other edge. No other transition is
/// permitted — see `CityStateManager`'s state machine doc for the
/// enforcement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Prepared,
    Committed,
    Charged,
    Aborted,
}

/// A city manager's record of one reservation it is holding or has held.
///
/// Invariants:
/// - at most one live (non-ABORTED, non-CHARGED) reservation per
///   `(worker_id, overlapping window)` — enforced by the worker, not here;
/// - status transitions are monotone per `ReservationStatus`;
/// - `transaction_id` uniquely identifies this tuple inside one manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub transaction_id: TransactionId,
    pub vehicle_id: VehicleId,
    pub request_id: RequestId,
    pub city: String,
    pub window: ReservationWindow,
    pub status: ReservationStatus,
    /// Empty/`None` if the local instance is the coordinator for this
    /// transaction.
    pub coordinator_url: Option<String>,
    /// Assigned at PREPARE time; `None` only in the instant between
    /// "worker accepted" and "record appended", which never escapes the
    /// manager's lock.
    pub worker_id: Option<WorkerId>,
}
