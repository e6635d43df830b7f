use serde::{Deserialize, Serialize};

use crate::model::{Reservation, ReservationWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteOutcome {
    Prepared,
    Rejected,
}

/// Body of `POST /2pc_remote/prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePrepareRequest {
    pub transaction_id: String,
    pub vehicle_id: String,
    pub request_id: String,
    pub city: String,
    pub window: ReservationWindow,
    pub coordinator_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePrepareResponse {
    pub status: RemoteOutcome,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared body of `/2pc_remote/commit` and `/2pc_remote/abort`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRef {
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub transaction_id: String,
    pub acknowledged: bool,
}

/// Body of `POST /report-segment-completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSegmentCompletionRequest {
    pub transaction_id: String,
    pub segment_city: String,
    pub cost: f64,
}

/// `GET /status` response: managed city, capacity, live reservations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub city: String,
    pub capacity: usize,
    pub reservations: Vec<Reservation>,
}
