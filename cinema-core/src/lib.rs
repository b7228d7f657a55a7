pub mod booking;
pub mod error;
pub mod events;
pub mod lock;
pub mod repository;
pub mod screening;
pub mod seat;

pub use booking::{Booking, BookingFilter, BookingStatus};
pub use error::{BookingError, BookingResult, StoreError, StoreResult};
pub use lock::{LockToken, SeatLockStore};
pub use screening::Screening;
pub use seat::{Seat, SeatId, SeatStatus, SeatView};
