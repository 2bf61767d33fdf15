//! Ticket issuance. Payment clearance is an upstream precondition; by the
//! time this service runs, the order has been paid or approved.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Ticket, TicketState};
use crate::store::{CheckInStore, TicketInsert};
use crate::token::{TokenClaims, TokenCodec};
use crate::utils::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTicket {
    pub ticket: Ticket,
    /// The signed payload to embed in the scannable code.
    pub token: String,
}

pub struct TicketIssuer {
    store: Arc<dyn CheckInStore>,
    codec: TokenCodec,
}

impl TicketIssuer {
    pub fn new(store: Arc<dyn CheckInStore>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    fn claims(ticket: &Ticket) -> TokenClaims {
        TokenClaims {
            ticket_id: ticket.id,
            student_id: ticket.student_id,
            exam_id: ticket.exam_id,
            venue_id: ticket.venue_id,
            token_version: ticket.token_version,
            issued_at: ticket.issued_at,
        }
    }

    /// Mints a ticket in `ISSUED` at token version 0, with its encoded token.
    pub async fn issue(
        &self,
        exam_id: Uuid,
        student_id: Uuid,
        venue_id: Uuid,
    ) -> Result<IssuedTicket, AppError> {
        let now = Utc::now();

        let exam = self
            .store
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| AppError::InvalidReference(format!("unknown exam {exam_id}")))?;
        if exam.is_over(now) {
            return Err(AppError::InvalidReference(format!(
                "exam {exam_id} has already ended"
            )));
        }
        self.store
            .get_venue(venue_id)
            .await?
            .ok_or_else(|| AppError::InvalidReference(format!("unknown venue {venue_id}")))?;

        let ticket = Ticket {
            id: Uuid::new_v4(),
            exam_id,
            venue_id,
            student_id,
            amount: exam.fee,
            state: TicketState::Issued,
            token_version: 0,
            issued_at: now,
            updated_at: now,
        };

        match self.store.insert_ticket(&ticket).await? {
            TicketInsert::Inserted => {}
            TicketInsert::DuplicateActive => return Err(AppError::DuplicateTicket),
        }

        let token = self.codec.encode(&Self::claims(&ticket))?;
        tracing::info!(ticket_id = %ticket.id, exam_id = %exam_id, student_id = %student_id, "ticket issued");

        Ok(IssuedTicket { ticket, token })
    }

    /// Replaces the ticket's token: bumps the version so every previously
    /// issued token for it becomes stale.
    pub async fn reissue(&self, ticket_id: Uuid) -> Result<IssuedTicket, AppError> {
        if let Some(ticket) = self.store.bump_token_version(ticket_id).await? {
            let token = self.codec.encode(&Self::claims(&ticket))?;
            tracing::info!(ticket_id = %ticket_id, token_version = ticket.token_version, "ticket token reissued");
            return Ok(IssuedTicket { ticket, token });
        }

        match self.store.get_ticket(ticket_id).await? {
            None => Err(AppError::NotFound(format!("ticket {ticket_id}"))),
            Some(ticket) => Err(AppError::Validation(format!(
                "only ISSUED tickets can be reissued; ticket is {:?}",
                ticket.state
            ))),
        }
    }

    /// Administrative void. Absorbing; there is no reactivation.
    pub async fn void(&self, ticket_id: Uuid) -> Result<Ticket, AppError> {
        if self
            .store
            .transition_issued(ticket_id, TicketState::Void)
            .await?
        {
            tracing::info!(ticket_id = %ticket_id, "ticket voided");
            return self
                .store
                .get_ticket(ticket_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_id}")));
        }

        match self.store.get_ticket(ticket_id).await? {
            None => Err(AppError::NotFound(format!("ticket {ticket_id}"))),
            Some(ticket) => Err(AppError::Validation(format!(
                "only ISSUED tickets can be voided; ticket is {:?}",
                ticket.state
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exam, Venue};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn codec() -> TokenCodec {
        TokenCodec::new(*b"issuer-test-secret-0123456789abc")
    }

    async fn seeded_store() -> (Arc<MemoryStore>, Exam, Venue) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let exam = Exam {
            id: Uuid::new_v4(),
            title: "Web Development Final Exam".to_string(),
            course_id: Uuid::new_v4(),
            scheduled_at: now + Duration::hours(1),
            duration_minutes: 120,
            fee: Decimal::new(25_000, 0),
            created_at: now,
        };
        let venue = Venue {
            id: Uuid::new_v4(),
            name: "Main Hall".to_string(),
            address: Some("Plot 123, Dar es Salaam".to_string()),
            capacity: 200,
            created_at: now,
        };
        store.insert_exam(&exam).await.unwrap();
        store.insert_venue(&venue).await.unwrap();
        (store, exam, venue)
    }

    #[tokio::test]
    async fn issue_creates_ticket_with_decodable_token() {
        let (store, exam, venue) = seeded_store().await;
        let issuer = TicketIssuer::new(store, codec());

        let student = Uuid::new_v4();
        let issued = issuer.issue(exam.id, student, venue.id).await.unwrap();

        assert_eq!(issued.ticket.state, TicketState::Issued);
        assert_eq!(issued.ticket.token_version, 0);
        assert_eq!(issued.ticket.amount, exam.fee);

        let claims = codec().decode(&issued.token).unwrap();
        assert_eq!(claims.ticket_id, issued.ticket.id);
        assert_eq!(claims.student_id, student);
        assert_eq!(claims.venue_id, venue.id);
    }

    #[tokio::test]
    async fn second_active_ticket_for_pair_is_rejected() {
        let (store, exam, venue) = seeded_store().await;
        let issuer = TicketIssuer::new(store, codec());

        let student = Uuid::new_v4();
        issuer.issue(exam.id, student, venue.id).await.unwrap();
        let err = issuer.issue(exam.id, student, venue.id).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateTicket));
    }

    #[tokio::test]
    async fn voiding_frees_the_slot() {
        let (store, exam, venue) = seeded_store().await;
        let issuer = TicketIssuer::new(store, codec());

        let student = Uuid::new_v4();
        let first = issuer.issue(exam.id, student, venue.id).await.unwrap();
        let voided = issuer.void(first.ticket.id).await.unwrap();
        assert_eq!(voided.state, TicketState::Void);

        issuer.issue(exam.id, student, venue.id).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_references_are_rejected() {
        let (store, exam, venue) = seeded_store().await;
        let issuer = TicketIssuer::new(store, codec());

        let err = issuer
            .issue(Uuid::new_v4(), Uuid::new_v4(), venue.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReference(_)));

        let err = issuer
            .issue(exam.id, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn past_exam_is_rejected() {
        let (store, _, venue) = seeded_store().await;
        let now = Utc::now();
        let past = Exam {
            id: Uuid::new_v4(),
            title: "Old Exam".to_string(),
            course_id: Uuid::new_v4(),
            scheduled_at: now - Duration::hours(4),
            duration_minutes: 60,
            fee: Decimal::new(10_000, 0),
            created_at: now - Duration::days(7),
        };
        store.insert_exam(&past).await.unwrap();

        let issuer = TicketIssuer::new(store, codec());
        let err = issuer
            .issue(past.id, Uuid::new_v4(), venue.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn reissue_bumps_version_and_mints_new_token() {
        let (store, exam, venue) = seeded_store().await;
        let issuer = TicketIssuer::new(store, codec());

        let issued = issuer.issue(exam.id, Uuid::new_v4(), venue.id).await.unwrap();
        let reissued = issuer.reissue(issued.ticket.id).await.unwrap();

        assert_eq!(reissued.ticket.token_version, 1);
        assert_ne!(issued.token, reissued.token);
        assert_eq!(codec().decode(&reissued.token).unwrap().token_version, 1);
    }
}
