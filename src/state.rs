use std::sync::Arc;

use chrono::Duration;

use crate::notify::CheckInNotifier;
use crate::services::{AttendanceLedger, CheckInService, TicketIssuer};
use crate::store::CheckInStore;
use crate::token::TokenCodec;

/// Shared handler state: the store plus the three services built over it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckInStore>,
    pub issuer: Arc<TicketIssuer>,
    pub checkin: Arc<CheckInService>,
    pub ledger: Arc<AttendanceLedger>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CheckInStore>,
        codec: TokenCodec,
        notifier: Arc<dyn CheckInNotifier>,
        grace: Duration,
    ) -> Self {
        Self {
            issuer: Arc::new(TicketIssuer::new(store.clone(), codec.clone())),
            checkin: Arc::new(CheckInService::new(
                store.clone(),
                codec,
                notifier,
                grace,
            )),
            ledger: Arc::new(AttendanceLedger::new(store.clone())),
            store,
        }
    }
}
