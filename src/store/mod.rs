//! Persistence seam for tickets, reference data, and the attendance ledger.
//!
//! The one hard requirement on implementations is `claim_for_check_in`: a
//! linearizable per-ticket test-and-set of `ISSUED -> CHECKED_IN` that also
//! records the ledger event in the same atomic unit. Everything else is
//! ordinary reads and inserts.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CheckInEvent, Exam, Ticket, TicketState, Venue};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// 1-based page request.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, 500),
        }
    }

    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TicketFilter {
    pub exam_id: Option<Uuid>,
    pub venue_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub state: Option<TicketState>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub exam_id: Option<Uuid>,
    pub venue_id: Option<Uuid>,
}

/// Result of inserting a ticket under the one-active-ticket rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketInsert {
    Inserted,
    /// A non-void ticket already exists for this (student, exam) pair.
    DuplicateActive,
}

/// Result of the check-in test-and-set.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller won the transition; the event is now in the ledger.
    Claimed(CheckInEvent),
    /// An earlier check-in already consumed the ticket.
    AlreadyCheckedIn,
    /// Ticket is in a terminal non-usable state (void or expired).
    NotClaimable(TicketState),
    /// No such ticket.
    Missing,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceCounts {
    /// Tickets issued for the exam, voids excluded.
    pub issued: u64,
    pub checked_in: u64,
}

#[async_trait]
pub trait CheckInStore: Send + Sync {
    // Reference data
    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError>;
    async fn get_exam(&self, id: Uuid) -> Result<Option<Exam>, StoreError>;
    async fn insert_venue(&self, venue: &Venue) -> Result<(), StoreError>;
    async fn get_venue(&self, id: Uuid) -> Result<Option<Venue>, StoreError>;

    // Tickets
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<TicketInsert, StoreError>;
    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;
    /// Tickets matching the filter, issued_at ascending, with the total count.
    async fn list_tickets(
        &self,
        filter: TicketFilter,
        page: Page,
    ) -> Result<(Vec<Ticket>, u64), StoreError>;
    /// Bumps the token version of an ISSUED ticket. Returns the updated row,
    /// or `None` when the ticket is missing or no longer ISSUED.
    async fn bump_token_version(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;
    /// Conditionally moves an ISSUED ticket into a terminal state (void or
    /// expired). Returns whether this caller performed the transition.
    async fn transition_issued(&self, id: Uuid, to: TicketState) -> Result<bool, StoreError>;
    /// The atomicity-critical operation: iff the ticket is ISSUED, move it to
    /// CHECKED_IN and append `event` to the ledger. Exactly one concurrent
    /// caller can ever observe `Claimed` for a given ticket.
    async fn claim_for_check_in(&self, event: CheckInEvent) -> Result<ClaimOutcome, StoreError>;

    // Attendance ledger
    /// Events matching the filter, timestamp ascending, with the total count.
    async fn list_events(
        &self,
        filter: EventFilter,
        page: Page,
    ) -> Result<(Vec<CheckInEvent>, u64), StoreError>;
    async fn exam_attendance(&self, exam_id: Uuid) -> Result<AttendanceCounts, StoreError>;
}
