use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open UTC interval `[start, end)` claimed for one vehicle on one
/// worker. Invariant: `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReservationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(end > start, "reservation window end must be after start");
        Self { start, end }
    }

    /// True iff `self` and `other`, both half-open `[start, end)`, share at
    /// least one instant.
    pub fn overlaps(&self, other: &ReservationWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now > self.end
    }
}
