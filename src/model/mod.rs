pub mod id;
pub mod reservation;
pub mod route;
pub mod transaction;
pub mod window;
pub mod worker_reservation;

pub use id::{RequestId, TransactionId, VehicleId, WorkerId};
pub use reservation::{Reservation, ReservationStatus};
pub use route::{Route, RouteSegment};
pub use transaction::TransactionProgress;
pub use window::ReservationWindow;
pub use worker_reservation::{WorkerReservation, WorkerReservationStatus};
