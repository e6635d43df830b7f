use serde::{Deserialize, Serialize};

use crate::model::{RequestId, ReservationWindow, RouteSegment, TransactionId, VehicleId, WorkerId};

/// Commands a City State Manager sends to a Charging-Point Worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum WorkerCommand {
    #[serde(rename = "PREPARE_RESERVE_WINDOW")]
    PrepareReserveWindow { window: ReservationWindow, transaction_id: TransactionId, response_topic: String },
    #[serde(rename = "COMMIT")]
    Commit { transaction_id: TransactionId },
    #[serde(rename = "ABORT")]
    Abort { transaction_id: TransactionId },
}

/// A worker's reply to `PrepareReserveWindow`, published on the command's
/// `response_topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareResponse {
    pub success: bool,
    pub transaction_id: TransactionId,
    pub worker_id: WorkerId,
}

/// Emitted by a worker once a committed window has elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename = "VEHICLE_PASSED_AND_CHARGED")]
pub struct VehiclePassedAndCharged {
    pub transaction_id: TransactionId,
    pub cost: f64,
    pub window: ReservationWindow,
    pub worker_id: WorkerId,
}

/// `RouteRequest` consumed on `car/route_request/<enterprise>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub vehicle_id: String,
    pub origin: String,
    pub destination: String,
}

/// `RouteReservationOptions` published back to `<vehicle_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteReservationOptions {
    pub request_id: String,
    pub vehicle_id: String,
    pub routes: Vec<Vec<RouteSegment>>,
}

/// `ChosenRoute` consumed on `car/route/<enterprise>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChosenRoute {
    pub request_id: String,
    pub vehicle_id: String,
    pub route: Vec<RouteSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationOutcome {
    Confirmed,
    Rejected,
}

/// `ReservationStatus` published on `car/reservation/status/<vehicle_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationStatusMsg {
    pub transaction_id: TransactionId,
    pub vehicle_id: VehicleId,
    pub request_id: RequestId,
    pub status: ReservationOutcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_route: Option<Vec<RouteSegment>>,
}

/// Published on `car/journey/finished/<vehicle_id>` once every segment of a
/// transaction has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyFinished {
    pub status: String,
    pub transaction_id: TransactionId,
    pub message: String,
}
