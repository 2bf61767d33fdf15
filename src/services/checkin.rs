//! The check-in state machine.
//!
//! A presented token goes through decode, ticket lookup, version match,
//! venue binding, and admission-window checks before the single
//! atomicity-critical step: the store's per-ticket test-and-set of
//! `ISSUED -> CHECKED_IN`. Every rejection is an expected outcome carrying a
//! reason code, never an error, and (lazy expiry aside) mutates nothing.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{CheckInEvent, CheckInMethod, Ticket, TicketState};
use crate::notify::CheckInNotifier;
use crate::store::{CheckInStore, ClaimOutcome};
use crate::token::TokenCodec;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidToken,
    UnknownTicket,
    StaleToken,
    WrongVenue,
    OutOfWindow,
    AlreadyUsed,
    TicketInvalid,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::InvalidToken => "INVALID_TOKEN",
            RejectReason::UnknownTicket => "UNKNOWN_TICKET",
            RejectReason::StaleToken => "STALE_TOKEN",
            RejectReason::WrongVenue => "WRONG_VENUE",
            RejectReason::OutOfWindow => "OUT_OF_WINDOW",
            RejectReason::AlreadyUsed => "ALREADY_USED",
            RejectReason::TicketInvalid => "TICKET_INVALID",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            RejectReason::InvalidToken => "The presented code could not be verified",
            RejectReason::UnknownTicket => "No ticket matches the presented code",
            RejectReason::StaleToken => "This ticket code has been replaced; present the latest one",
            RejectReason::WrongVenue => "This ticket is for a different venue",
            RejectReason::OutOfWindow => "Check-in is not open for this exam",
            RejectReason::AlreadyUsed => "This ticket has already been used to check in",
            RejectReason::TicketInvalid => "This ticket is no longer valid",
        }
    }
}

#[derive(Debug)]
pub enum CheckInOutcome {
    Accepted {
        ticket: Ticket,
        event: CheckInEvent,
    },
    Rejected(RejectReason),
}

pub struct CheckInService {
    store: Arc<dyn CheckInStore>,
    codec: TokenCodec,
    notifier: Arc<dyn CheckInNotifier>,
    /// How long before the scheduled start a proctor may admit students.
    grace: Duration,
}

impl CheckInService {
    pub fn new(
        store: Arc<dyn CheckInStore>,
        codec: TokenCodec,
        notifier: Arc<dyn CheckInNotifier>,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            notifier,
            grace,
        }
    }

    /// Verifies a presented token and, if everything lines up, performs the
    /// idempotent `ISSUED -> CHECKED_IN` transition. Safe to retry: only one
    /// caller ever observes `Accepted` for a ticket, all later ones get
    /// `ALREADY_USED`.
    pub async fn check_in(
        &self,
        presented_token: &str,
        venue_id: Uuid,
        proctor_id: Uuid,
        method: CheckInMethod,
    ) -> Result<CheckInOutcome, AppError> {
        use CheckInOutcome::Rejected;
        use RejectReason::*;

        // Structural and signature validation comes first; claims from a
        // token that fails here are never trusted, not even for logging.
        let claims = match self.codec.decode(presented_token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(raw_len = presented_token.len(), %err, "rejected unverifiable token");
                return Ok(Rejected(InvalidToken));
            }
        };

        let Some(ticket) = self.store.get_ticket(claims.ticket_id).await? else {
            return Ok(Rejected(UnknownTicket));
        };

        // A reissued ticket invalidates every earlier token.
        if claims.token_version != ticket.token_version {
            return Ok(Rejected(StaleToken));
        }

        // The token is bound to the venue it was issued for; the proctor's
        // device says where the scan is physically happening.
        if claims.venue_id != venue_id {
            return Ok(Rejected(WrongVenue));
        }

        let Some(exam) = self.store.get_exam(ticket.exam_id).await? else {
            tracing::warn!(ticket_id = %ticket.id, exam_id = %ticket.exam_id, "ticket references missing exam");
            return Ok(Rejected(TicketInvalid));
        };

        let now = Utc::now();
        if now < exam.scheduled_at - self.grace {
            return Ok(Rejected(OutOfWindow));
        }
        if exam.is_over(now) {
            // Lazy expiry: no background sweep marks tickets, the first
            // post-deadline presentation does. Losing this race to another
            // scanner changes nothing observable.
            if ticket.state == TicketState::Issued {
                self.store
                    .transition_issued(ticket.id, TicketState::Expired)
                    .await?;
            }
            return Ok(Rejected(OutOfWindow));
        }

        let event = CheckInEvent {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            student_id: ticket.student_id,
            exam_id: ticket.exam_id,
            venue_id,
            proctor_id,
            method,
            timestamp: now,
        };

        match self.store.claim_for_check_in(event).await? {
            ClaimOutcome::Claimed(event) => {
                tracing::info!(
                    ticket_id = %ticket.id,
                    check_in_id = %event.id,
                    proctor_id = %proctor_id,
                    "check-in accepted"
                );
                self.notifier.checked_in(&event);
                let ticket = Ticket {
                    state: TicketState::CheckedIn,
                    updated_at: event.timestamp,
                    ..ticket
                };
                Ok(CheckInOutcome::Accepted { ticket, event })
            }
            ClaimOutcome::AlreadyCheckedIn => Ok(Rejected(AlreadyUsed)),
            ClaimOutcome::NotClaimable(_) => Ok(Rejected(TicketInvalid)),
            ClaimOutcome::Missing => Ok(Rejected(UnknownTicket)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exam, Venue};
    use crate::notify::LogNotifier;
    use crate::services::issuer::TicketIssuer;
    use crate::store::{EventFilter, MemoryStore, Page};
    use crate::token::TokenClaims;
    use rust_decimal::Decimal;

    const SECRET: &[u8; 32] = b"checkin-test-secret-0123456789ab";

    struct Fixture {
        store: Arc<MemoryStore>,
        service: CheckInService,
        issuer: TicketIssuer,
        exam: Exam,
        venue: Venue,
    }

    /// Exam already in progress, 30-minute grace window.
    async fn fixture() -> Fixture {
        fixture_with_start(Utc::now() - Duration::minutes(10)).await
    }

    async fn fixture_with_start(scheduled_at: chrono::DateTime<Utc>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let exam = Exam {
            id: Uuid::new_v4(),
            title: "Web Development Final Exam".to_string(),
            course_id: Uuid::new_v4(),
            scheduled_at,
            duration_minutes: 120,
            fee: Decimal::new(25_000, 0),
            created_at: now,
        };
        let venue = Venue {
            id: Uuid::new_v4(),
            name: "Dar es Salaam High School".to_string(),
            address: None,
            capacity: 150,
            created_at: now,
        };
        store.insert_exam(&exam).await.unwrap();
        store.insert_venue(&venue).await.unwrap();

        let codec = TokenCodec::new(*SECRET);
        let service = CheckInService::new(
            store.clone(),
            codec.clone(),
            Arc::new(LogNotifier),
            Duration::minutes(30),
        );
        let issuer = TicketIssuer::new(store.clone(), codec);

        Fixture {
            store,
            service,
            issuer,
            exam,
            venue,
        }
    }

    async fn ledger_len(store: &MemoryStore) -> u64 {
        let (_, total) = store
            .list_events(EventFilter::default(), Page::new(1, 100))
            .await
            .unwrap();
        total
    }

    #[tokio::test]
    async fn accepts_then_rejects_identical_retry() {
        let f = fixture().await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();
        let proctor = Uuid::new_v4();

        let first = f
            .service
            .check_in(&issued.token, f.venue.id, proctor, CheckInMethod::Scanned)
            .await
            .unwrap();
        match first {
            CheckInOutcome::Accepted { ticket, event } => {
                assert_eq!(ticket.state, TicketState::CheckedIn);
                assert_eq!(event.ticket_id, issued.ticket.id);
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(ledger_len(&f.store).await, 1);

        // Identical retry, as a client would after a timeout
        let second = f
            .service
            .check_in(&issued.token, f.venue.id, proctor, CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            second,
            CheckInOutcome::Rejected(RejectReason::AlreadyUsed)
        ));
        assert_eq!(ledger_len(&f.store).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_admit_exactly_one() {
        let f = fixture().await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();

        let service = Arc::new(f.service);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let token = issued.token.clone();
            let venue_id = f.venue.id;
            handles.push(tokio::spawn(async move {
                service
                    .check_in(&token, venue_id, Uuid::new_v4(), CheckInMethod::Scanned)
                    .await
                    .unwrap()
            }));
        }

        let mut accepted = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.await.unwrap() {
                CheckInOutcome::Accepted { .. } => accepted += 1,
                CheckInOutcome::Rejected(RejectReason::AlreadyUsed) => already_used += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(already_used, 15);
        assert_eq!(ledger_len(&f.store).await, 1);
    }

    #[tokio::test]
    async fn stale_token_after_reissue_is_rejected() {
        let f = fixture().await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();
        let reissued = f.issuer.reissue(issued.ticket.id).await.unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::StaleToken)
        ));

        // The replacement token still works
        let outcome = f
            .service
            .check_in(&reissued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(outcome, CheckInOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn wrong_venue_is_rejected_without_state_change() {
        let f = fixture().await;
        let other_venue = Venue {
            id: Uuid::new_v4(),
            name: "Annex Hall".to_string(),
            address: None,
            capacity: 50,
            created_at: Utc::now(),
        };
        f.store.insert_venue(&other_venue).await.unwrap();

        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, other_venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::WrongVenue)
        ));

        let ticket = f.store.get_ticket(issued.ticket.id).await.unwrap().unwrap();
        assert_eq!(ticket.state, TicketState::Issued);
        assert_eq!(ledger_len(&f.store).await, 0);
    }

    #[tokio::test]
    async fn early_arrival_outside_grace_is_rejected() {
        let f = fixture_with_start(Utc::now() + Duration::hours(3)).await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::OutOfWindow)
        ));

        // Early arrival does not expire the ticket
        let ticket = f.store.get_ticket(issued.ticket.id).await.unwrap().unwrap();
        assert_eq!(ticket.state, TicketState::Issued);
    }

    #[tokio::test]
    async fn within_grace_window_is_accepted() {
        let f = fixture_with_start(Utc::now() + Duration::minutes(20)).await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(outcome, CheckInOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn after_exam_end_ticket_lazily_expires() {
        let f = fixture().await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();

        // Replace the exam with one that ended an hour ago; issuance happened
        // while it was still running.
        let ended = Exam {
            scheduled_at: Utc::now() - Duration::hours(3),
            duration_minutes: 120,
            ..f.exam.clone()
        };
        f.store.insert_exam(&ended).await.unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::OutOfWindow)
        ));

        let ticket = f.store.get_ticket(issued.ticket.id).await.unwrap().unwrap();
        assert_eq!(ticket.state, TicketState::Expired);

        // The absorbing state now answers for itself
        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::TicketInvalid)
        ));
    }

    #[tokio::test]
    async fn voided_ticket_is_rejected_as_invalid() {
        let f = fixture().await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();
        f.issuer.void(issued.ticket.id).await.unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::TicketInvalid)
        ));
    }

    #[tokio::test]
    async fn garbage_and_unknown_tokens_are_rejected() {
        let f = fixture().await;

        let outcome = f
            .service
            .check_in("not-a-token", f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::InvalidToken)
        ));

        // Well-signed token for a ticket that was never issued
        let codec = TokenCodec::new(*SECRET);
        let ghost = codec
            .encode(&TokenClaims {
                ticket_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                exam_id: f.exam.id,
                venue_id: f.venue.id,
                token_version: 0,
                issued_at: Utc::now(),
            })
            .unwrap();
        let outcome = f
            .service
            .check_in(&ghost, f.venue.id, Uuid::new_v4(), CheckInMethod::Scanned)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Rejected(RejectReason::UnknownTicket)
        ));
        assert_eq!(ledger_len(&f.store).await, 0);
    }

    #[tokio::test]
    async fn manual_method_is_recorded_on_the_event() {
        let f = fixture().await;
        let issued = f
            .issuer
            .issue(f.exam.id, Uuid::new_v4(), f.venue.id)
            .await
            .unwrap();

        let outcome = f
            .service
            .check_in(&issued.token, f.venue.id, Uuid::new_v4(), CheckInMethod::Manual)
            .await
            .unwrap();
        match outcome {
            CheckInOutcome::Accepted { event, .. } => {
                assert_eq!(event.method, CheckInMethod::Manual);
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }
}
