pub mod holder;
pub mod show;
pub mod seat;
pub mod reservation;
pub mod booking;

pub use holder::HolderId;
pub use show::Show;
pub use seat::{Seat, SeatRef};
pub use reservation::{ReservationRecord, SeatState};
pub use booking::{Booking, BookingLine, PaymentMethod, PaymentOutcome, Ticket};
