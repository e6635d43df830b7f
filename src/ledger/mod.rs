use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Route;

/// Mirrors the chaincode asset shape from
/// `original_source/chaincode/smart_contract.go`'s `ChargingTransaction`,
/// translated to snake_case. `status` follows the chaincode's own string
/// states (`RESERVED` → `CHARGING` → `COMPLETED` → `PAID`), distinct from
/// `model::ReservationStatus` which tracks per-city worker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub vehicle_id: String,
    pub route: Route,
    pub status: String,
    pub cost: f64,
    pub energy_consumed: f64,
    pub reservation_timestamp_utc: Option<DateTime<Utc>>,
    pub charging_start_timestamp_utc: Option<DateTime<Utc>>,
    pub charging_end_timestamp_utc: Option<DateTime<Utc>>,
    pub payment_timestamp_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricState {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    pub value: Option<LedgerTransaction>,
}

/// Audit contract for recording reservation, completion, and payment
/// states against a distributed ledger running out of process. Grounded
/// on `original_source/chaincode/smart_contract.go`'s public surface.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn register_reserve(&self, transaction_id: &str, vehicle_id: &str, route: &Route) -> Result<()>;
    async fn start_charging(&self, transaction_id: &str) -> Result<()>;
    async fn end_charging(&self, transaction_id: &str, cost: &str, energy_consumed: &str) -> Result<()>;
    async fn register_payment(&self, transaction_id: &str) -> Result<()>;
    async fn query_transaction(&self, transaction_id: &str) -> Result<LedgerTransaction>;
    async fn get_transaction_history(&self, transaction_id: &str) -> Result<Vec<HistoricState>>;
}

/// In-process stand-in for the chaincode ledger, for tests and local runs.
/// State transitions mirror the Go reference exactly: `RegisterReserve`
/// requires the id be unused, `StartCharging` requires `RESERVED`,
/// `EndCharging` requires `CHARGING`, `RegisterPayment` requires
/// `COMPLETED`.
#[derive(Default)]
pub struct InMemoryLedger {
    transactions: Mutex<HashMap<String, LedgerTransaction>>,
    history: Mutex<HashMap<String, Vec<HistoricState>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_history(&self, transaction_id: &str, value: Option<LedgerTransaction>) {
        let mut history = self.history.lock().expect("InMemoryLedger history lock poisoned");
        history.entry(transaction_id.to_string()).or_default().push(HistoricState {
            tx_id: transaction_id.to_string(),
            timestamp: Utc::now(),
            is_delete: value.is_none(),
            value,
        });
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn register_reserve(&self, transaction_id: &str, vehicle_id: &str, route: &Route) -> Result<()> {
        let mut transactions = self.transactions.lock().expect("InMemoryLedger transactions lock poisoned");
        if transactions.contains_key(transaction_id) {
            return Err(Error::LedgerFailure(format!("transaction with ID {} already exists", transaction_id)));
        }
        let transaction = LedgerTransaction {
            transaction_id: transaction_id.to_string(),
            vehicle_id: vehicle_id.to_string(),
            route: route.clone(),
            status: "RESERVED".to_string(),
            cost: 0.0,
            energy_consumed: 0.0,
            reservation_timestamp_utc: Some(Utc::now()),
            charging_start_timestamp_utc: None,
            charging_end_timestamp_utc: None,
            payment_timestamp_utc: None,
        };
        transactions.insert(transaction_id.to_string(), transaction.clone());
        drop(transactions);
        self.record_history(transaction_id, Some(transaction));
        Ok(())
    }

    async fn start_charging(&self, transaction_id: &str) -> Result<()> {
        let mut transactions = self.transactions.lock().expect("InMemoryLedger transactions lock poisoned");
        let transaction = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| Error::LedgerFailure(format!("transaction with ID {} does not exist", transaction_id)))?;
        if transaction.status != "RESERVED" {
            return Err(Error::LedgerFailure(format!("transaction with ID {} is not in RESERVED status", transaction_id)));
        }
        transaction.status = "CHARGING".to_string();
        transaction.charging_start_timestamp_utc = Some(Utc::now());
        let snapshot = transaction.clone();
        drop(transactions);
        self.record_history(transaction_id, Some(snapshot));
        Ok(())
    }

    async fn end_charging(&self, transaction_id: &str, cost: &str, energy_consumed: &str) -> Result<()> {
        let cost: f64 = cost.parse().map_err(|_| Error::LedgerFailure(format!("invalid cost value: {}", cost)))?;
        let energy_consumed: f64 = energy_consumed
            .parse()
            .map_err(|_| Error::LedgerFailure(format!("invalid energy value: {}", energy_consumed)))?;

        let mut transactions = self.transactions.lock().expect("InMemoryLedger transactions lock poisoned");
        let transaction = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| Error::LedgerFailure(format!("transaction with ID {} does not exist", transaction_id)))?;
        if transaction.status != "CHARGING" {
            return Err(Error::LedgerFailure(format!("transaction with ID {} is not in CHARGING status", transaction_id)));
        }
        transaction.status = "COMPLETED".to_string();
        transaction.cost = cost;
        transaction.energy_consumed = energy_consumed;
        transaction.charging_end_timestamp_utc = Some(Utc::now());
        let snapshot = transaction.clone();
        drop(transactions);
        self.record_history(transaction_id, Some(snapshot));
        Ok(())
    }

    async fn register_payment(&self, transaction_id: &str) -> Result<()> {
        let mut transactions = self.transactions.lock().expect("InMemoryLedger transactions lock poisoned");
        let transaction = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| Error::LedgerFailure(format!("transaction with ID {} does not exist", transaction_id)))?;
        if transaction.status != "COMPLETED" {
            return Err(Error::LedgerFailure(format!("transaction with ID {} is not in COMPLETED status", transaction_id)));
        }
        transaction.status = "PAID".to_string();
        transaction.payment_timestamp_utc = Some(Utc::now());
        let snapshot = transaction.clone();
        drop(transactions);
        self.record_history(transaction_id, Some(snapshot));
        Ok(())
    }

    async fn query_transaction(&self, transaction_id: &str) -> Result<LedgerTransaction> {
        let transactions = self.transactions.lock().expect("InMemoryLedger transactions lock poisoned");
        transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| Error::LedgerFailure(format!("transaction with ID {} does not exist", transaction_id)))
    }

    async fn get_transaction_history(&self, transaction_id: &str) -> Result<Vec<HistoricState>> {
        let history = self.history.lock().expect("InMemoryLedger history lock poisoned");
        Ok(history.get(transaction_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_lifecycle_matches_chaincode_state_machine() {
        let ledger = InMemoryLedger::new();
        let route = vec![];

        ledger.register_reserve("tx-1", "vehicle-1", &route).await.unwrap();
        assert!(ledger.start_charging("tx-1").await.is_ok());
        assert!(ledger.end_charging("tx-1", "40.00", "0.0").await.is_ok());
        assert!(ledger.register_payment("tx-1").await.is_ok());

        let transaction = ledger.query_transaction("tx-1").await.unwrap();
        assert_eq!(transaction.status, "PAID");
        assert_eq!(transaction.cost, 40.0);

        let history = ledger.get_transaction_history("tx-1").await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn end_charging_before_start_charging_is_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.register_reserve("tx-2", "vehicle-2", &vec![]).await.unwrap();
        assert!(ledger.end_charging("tx-2", "20.00", "0.0").await.is_err());
    }

    #[tokio::test]
    async fn duplicate_register_reserve_is_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.register_reserve("tx-3", "vehicle-3", &vec![]).await.unwrap();
        assert!(ledger.register_reserve("tx-3", "vehicle-3", &vec![]).await.is_err());
    }
}
