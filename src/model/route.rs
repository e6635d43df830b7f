use serde::{Deserialize, Serialize};

use super::window::ReservationWindow;

/// One leg of a route: a city and the window reserved there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub city: String,
    pub window: ReservationWindow,
}

/// An ordered, non-empty sequence of segments chosen by a vehicle. Cities
/// need not be distinct in principle; the routing layer avoids repeats.
pub type Route = Vec<RouteSegment>;
