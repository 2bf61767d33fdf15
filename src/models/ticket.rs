use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an exam ticket. Transitions are monotonic: once a ticket
/// leaves `Issued` it never returns, and the three terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "ticket_state", rename_all = "snake_case")]
pub enum TicketState {
    Issued,
    CheckedIn,
    Void,
    Expired,
}

impl TicketState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TicketState::Issued)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub venue_id: Uuid,
    pub student_id: Uuid,
    /// Exam fee recorded at issuance. Payment itself is handled upstream.
    pub amount: Decimal,
    pub state: TicketState,
    /// Incremented on token reissue; older tokens become stale.
    pub token_version: i32,
    pub issued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "check_in_method", rename_all = "snake_case")]
pub enum CheckInMethod {
    Scanned,
    Manual,
}

/// Append-only attendance record. At most one event exists per ticket; the
/// check-in state machine enforces this, the schema backs it up.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CheckInEvent {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub student_id: Uuid,
    pub exam_id: Uuid,
    pub venue_id: Uuid,
    pub proctor_id: Uuid,
    pub method: CheckInMethod,
    pub timestamp: DateTime<Utc>,
}
