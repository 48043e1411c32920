pub mod booking;
pub mod notifications;
pub mod sweeper;
pub mod tickets;

pub use booking::{BookingAggregator, Purchase};
pub use notifications::{BookingConfirmed, BookingNotifier};
pub use sweeper::ExpirySweeper;
pub use tickets::{TicketDetails, TicketOffice};
