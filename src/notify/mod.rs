//! Check-in event fan-out. Dashboards and other consumers live behind this
//! trait; the state machine calls it only after a transition has committed,
//! and the contract is infallible so a notifier can never undo a check-in.

use crate::models::CheckInEvent;

pub trait CheckInNotifier: Send + Sync {
    fn checked_in(&self, event: &CheckInEvent);
}

/// Emits check-in events to the log stream.
pub struct LogNotifier;

impl CheckInNotifier for LogNotifier {
    fn checked_in(&self, event: &CheckInEvent) {
        tracing::info!(
            check_in_id = %event.id,
            ticket_id = %event.ticket_id,
            exam_id = %event.exam_id,
            venue_id = %event.venue_id,
            method = ?event.method,
            "attendance recorded"
        );
    }
}
