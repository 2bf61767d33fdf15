pub mod checkin;
pub mod issuer;
pub mod ledger;

pub use checkin::{CheckInOutcome, CheckInService, RejectReason};
pub use issuer::{IssuedTicket, TicketIssuer};
pub use ledger::AttendanceLedger;
