use std::collections::HashSet;

use super::id::{TransactionId, VehicleId};
use super::route::Route;

/// Per-transaction completion tracker, held only by the coordinator for
/// that transaction. Created when the coordinator's PREPARE phase fully
/// succeeds, mutated by each segment completion report, discarded after
/// finalization.
#[derive(Debug, Clone)]
pub struct TransactionProgress {
    pub transaction_id: TransactionId,
    pub vehicle_id: VehicleId,
    /// Cities from the confirmed route, in order. Used both to compute
    /// `total_segments` and to validate that a reported segment city
    /// actually belongs to this transaction's route.
    pub segment_cities: Vec<String>,
    /// Segment city -> cost, for cities that have reported completion.
    /// A `HashSet`-backed dedup key of `(transaction_id, segment_city)`
    /// is implicit: this map only ever gains an entry once per city.
    completed: std::collections::HashMap<String, f64>,
}

impl TransactionProgress {
    pub fn new(transaction_id: TransactionId, vehicle_id: VehicleId, route: &Route) -> Self {
        Self {
            transaction_id,
            vehicle_id,
            segment_cities: route.iter().map(|s| s.city.clone()).collect(),
            completed: std::collections::HashMap::new(),
        }
    }

    pub fn total_segments(&self) -> usize {
        self.segment_cities.len()
    }

    /// Records a segment's completion cost. Idempotent: reporting the same
    /// city twice does not double count. Returns `(all_done, total_cost)`.
    pub fn record_segment(&mut self, city: &str, cost: f64) -> (bool, f64) {
        self.completed.entry(city.to_string()).or_insert(cost);
        let all_done = self.completed.len() >= self.total_segments();
        let total_cost = self.completed.values().sum();
        (all_done, total_cost)
    }

    pub fn completed_cities(&self) -> HashSet<String> {
        self.completed.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RouteSegment;
    use crate::model::window::ReservationWindow;
    use chrono::Utc;

    fn route(cities: &[&str]) -> Route {
        let now = Utc::now();
        cities
            .iter()
            .map(|c| RouteSegment { city: c.to_string(), window: ReservationWindow::new(now, now + chrono::Duration::minutes(1)) })
            .collect()
    }

    #[test]
    fn duplicate_segment_report_does_not_double_count_cost() {
        let mut progress = TransactionProgress::new(TransactionId::generate(), VehicleId::new("car-1"), &route(&["Salvador", "Ilheus"]));

        let (all_done, total) = progress.record_segment("Salvador", 20.0);
        assert!(!all_done);
        assert_eq!(total, 20.0);

        // duplicate report for the same city, different cost: ignored
        let (all_done, total) = progress.record_segment("Salvador", 99.0);
        assert!(!all_done);
        assert_eq!(total, 20.0);

        let (all_done, total) = progress.record_segment("Ilheus", 20.0);
        assert!(all_done);
        assert_eq!(total, 40.0);
    }
}
