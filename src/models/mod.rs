pub mod exam;
pub mod ticket;
pub mod venue;

pub use exam::Exam;
pub use ticket::{CheckInEvent, CheckInMethod, Ticket, TicketState};
pub use venue::Venue;
