use std::time::Duration;

use crate::error::{Error, Result};

use super::dto::{AckResponse, RemotePrepareRequest, RemotePrepareResponse, TransactionRef};

/// HTTP client a coordinator uses to drive two-phase commit against a
/// remote participant enterprise. 10 s timeout matches
/// `original_source/api/api.go`'s `http.Client{Timeout: time.Second * 10}`.
pub struct RemoteParticipantClient {
    http: reqwest::Client,
}

impl RemoteParticipantClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().expect("reqwest client with fixed timeout always builds");
        Self { http }
    }

    pub async fn prepare(&self, participant_api_url: &str, request: &RemotePrepareRequest) -> Result<RemotePrepareResponse> {
        let url = format!("{}/2pc_remote/prepare", participant_api_url);
        let response = self.http.post(&url).json(request).send().await.map_err(|e| Error::NetworkFailure(url.clone(), e.to_string()))?;

        match response.status().as_u16() {
            200 | 409 | 400 => response.json::<RemotePrepareResponse>().await.map_err(|e| Error::NetworkFailure(url, e.to_string())),
            other => Err(Error::NetworkFailure(url, format!("unexpected status {}", other))),
        }
    }

    pub async fn commit(&self, participant_api_url: &str, transaction_id: &str) -> Result<()> {
        let url = format!("{}/2pc_remote/commit", participant_api_url);
        let body = TransactionRef { transaction_id: transaction_id.to_string() };
        let response = self.http.post(&url).json(&body).send().await.map_err(|e| Error::NetworkFailure(url.clone(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::NetworkFailure(url, format!("unexpected status {}", response.status())));
        }
        let _: AckResponse = response.json().await.unwrap_or(AckResponse { transaction_id: transaction_id.to_string(), acknowledged: true });
        Ok(())
    }

    pub async fn abort(&self, participant_api_url: &str, transaction_id: &str) -> Result<()> {
        let url = format!("{}/2pc_remote/abort", participant_api_url);
        let body = TransactionRef { transaction_id: transaction_id.to_string() };
        let response = self.http.post(&url).json(&body).send().await.map_err(|e| Error::NetworkFailure(url.clone(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::NetworkFailure(url, format!("unexpected status {}", response.status())));
        }
        Ok(())
    }

    pub async fn report_segment_completion(&self, coordinator_api_url: &str, transaction_id: &str, segment_city: &str, cost: f64) -> Result<()> {
        let url = format!("{}/report-segment-completion", coordinator_api_url);
        let body = super::dto::ReportSegmentCompletionRequest { transaction_id: transaction_id.to_string(), segment_city: segment_city.to_string(), cost };
        let response = self.http.post(&url).json(&body).send().await.map_err(|e| Error::NetworkFailure(url.clone(), e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::NetworkFailure(url, format!("unexpected status {}", response.status())));
        }
        Ok(())
    }
}
