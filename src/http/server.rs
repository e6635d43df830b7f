use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::coordinator::ReservationCoordinator;
use crate::instance::EnterpriseContext;
use crate::model::{ReservationWindow, TransactionId};

use super::dto::{AckResponse, RemoteOutcome, RemotePrepareRequest, RemotePrepareResponse, ReportSegmentCompletionRequest, StatusResponse, TransactionRef};

#[derive(Clone)]
pub struct AppState {
    pub ctx: EnterpriseContext,
    pub coordinator: Arc<ReservationCoordinator>,
}

/// axum router exposing the `/2pc_remote/*`, `/report-segment-completion`,
/// and `/status` endpoints a peer coordinator drives.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/2pc_remote/prepare", post(prepare))
        .route("/2pc_remote/commit", post(commit))
        .route("/2pc_remote/abort", post(abort))
        .route("/report-segment-completion", post(report_segment_completion))
        .route("/status", get(status))
        .with_state(state)
}

async fn prepare(State(state): State<AppState>, Json(request): Json<RemotePrepareRequest>) -> impl IntoResponse {
    if request.city != state.ctx.owned_city() {
        let mismatch = crate::error::Error::CityMismatch { owned: state.ctx.owned_city().to_string(), requested: request.city.clone() };
        let response = RemotePrepareResponse { status: RemoteOutcome::Rejected, transaction_id: request.transaction_id.clone(), reason: Some(mismatch.to_string()) };
        return (StatusCode::BAD_REQUEST, Json(response));
    }

    let window: ReservationWindow = request.window;
    let outcome = state
        .ctx
        .city
        .prepare_reservation(
            TransactionId::new(request.transaction_id.clone()),
            crate::model::VehicleId::new(request.vehicle_id.clone()),
            crate::model::RequestId::new(request.request_id.clone()),
            window,
            Some(request.coordinator_url.clone()),
        )
        .await;

    match outcome {
        Ok(()) => {
            let response = RemotePrepareResponse { status: RemoteOutcome::Prepared, transaction_id: request.transaction_id, reason: None };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            let response = RemotePrepareResponse { status: RemoteOutcome::Rejected, transaction_id: request.transaction_id, reason: Some(e.to_string()) };
            (StatusCode::CONFLICT, Json(response))
        }
    }
}

async fn commit(State(state): State<AppState>, Json(body): Json<TransactionRef>) -> impl IntoResponse {
    let transaction_id = TransactionId::new(body.transaction_id.clone());
    state.ctx.city.commit_reservation(&transaction_id).await;
    Json(AckResponse { transaction_id: body.transaction_id, acknowledged: true })
}

async fn abort(State(state): State<AppState>, Json(body): Json<TransactionRef>) -> impl IntoResponse {
    let transaction_id = TransactionId::new(body.transaction_id.clone());
    state.ctx.city.abort_reservation(&transaction_id).await;
    Json(AckResponse { transaction_id: body.transaction_id, acknowledged: true })
}

async fn report_segment_completion(State(state): State<AppState>, Json(body): Json<ReportSegmentCompletionRequest>) -> impl IntoResponse {
    state.coordinator.handle_segment_completion_report(&body.transaction_id, &body.segment_city, body.cost).await;
    StatusCode::OK
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let (city, capacity, reservations) = state.ctx.city.city_availability().await;
    Json(StatusResponse { city, capacity, reservations })
}
