//! In-memory store. Used by the test suite and for running the service
//! without a database; one mutex guards all tables, so the check-in
//! test-and-set and its ledger append are trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{CheckInEvent, Exam, Ticket, TicketState, Venue};

use super::{
    AttendanceCounts, CheckInStore, ClaimOutcome, EventFilter, Page, StoreError, TicketFilter,
    TicketInsert,
};

#[derive(Default)]
struct Inner {
    exams: HashMap<Uuid, Exam>,
    venues: HashMap<Uuid, Venue>,
    tickets: HashMap<Uuid, Ticket>,
    events: Vec<CheckInEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_ticket(ticket: &Ticket, filter: TicketFilter) -> bool {
    filter.exam_id.map_or(true, |id| ticket.exam_id == id)
        && filter.venue_id.map_or(true, |id| ticket.venue_id == id)
        && filter.student_id.map_or(true, |id| ticket.student_id == id)
        && filter.state.map_or(true, |s| ticket.state == s)
}

fn matches_event(event: &CheckInEvent, filter: EventFilter) -> bool {
    filter.exam_id.map_or(true, |id| event.exam_id == id)
        && filter.venue_id.map_or(true, |id| event.venue_id == id)
}

fn page_slice<T>(items: Vec<T>, page: Page) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let out = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (out, total)
}

#[async_trait]
impl CheckInStore for MemoryStore {
    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        self.inner.lock().await.exams.insert(exam.id, exam.clone());
        Ok(())
    }

    async fn get_exam(&self, id: Uuid) -> Result<Option<Exam>, StoreError> {
        Ok(self.inner.lock().await.exams.get(&id).cloned())
    }

    async fn insert_venue(&self, venue: &Venue) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .venues
            .insert(venue.id, venue.clone());
        Ok(())
    }

    async fn get_venue(&self, id: Uuid) -> Result<Option<Venue>, StoreError> {
        Ok(self.inner.lock().await.venues.get(&id).cloned())
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<TicketInsert, StoreError> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner.tickets.values().any(|t| {
            t.student_id == ticket.student_id
                && t.exam_id == ticket.exam_id
                && t.state != TicketState::Void
        });
        if duplicate {
            return Ok(TicketInsert::DuplicateActive);
        }
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(TicketInsert::Inserted)
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.inner.lock().await.tickets.get(&id).cloned())
    }

    async fn list_tickets(
        &self,
        filter: TicketFilter,
        page: Page,
    ) -> Result<(Vec<Ticket>, u64), StoreError> {
        let inner = self.inner.lock().await;
        let mut matched: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| matches_ticket(t, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|t| (t.issued_at, t.id));
        Ok(page_slice(matched, page))
    }

    async fn bump_token_version(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.tickets.get_mut(&id) {
            Some(ticket) if ticket.state == TicketState::Issued => {
                ticket.token_version += 1;
                ticket.updated_at = chrono::Utc::now();
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_issued(&self, id: Uuid, to: TicketState) -> Result<bool, StoreError> {
        if !to.is_terminal() {
            return Ok(false);
        }
        let mut inner = self.inner.lock().await;
        match inner.tickets.get_mut(&id) {
            Some(ticket) if ticket.state == TicketState::Issued => {
                ticket.state = to;
                ticket.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_for_check_in(&self, event: CheckInEvent) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(ticket) = inner.tickets.get_mut(&event.ticket_id) else {
            return Ok(ClaimOutcome::Missing);
        };
        match ticket.state {
            TicketState::Issued => {
                ticket.state = TicketState::CheckedIn;
                ticket.updated_at = event.timestamp;
                inner.events.push(event.clone());
                Ok(ClaimOutcome::Claimed(event))
            }
            TicketState::CheckedIn => Ok(ClaimOutcome::AlreadyCheckedIn),
            state => Ok(ClaimOutcome::NotClaimable(state)),
        }
    }

    async fn list_events(
        &self,
        filter: EventFilter,
        page: Page,
    ) -> Result<(Vec<CheckInEvent>, u64), StoreError> {
        let inner = self.inner.lock().await;
        let mut matched: Vec<CheckInEvent> = inner
            .events
            .iter()
            .filter(|e| matches_event(e, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|e| (e.timestamp, e.id));
        Ok(page_slice(matched, page))
    }

    async fn exam_attendance(&self, exam_id: Uuid) -> Result<AttendanceCounts, StoreError> {
        let inner = self.inner.lock().await;
        let issued = inner
            .tickets
            .values()
            .filter(|t| t.exam_id == exam_id && t.state != TicketState::Void)
            .count() as u64;
        let checked_in = inner
            .events
            .iter()
            .filter(|e| e.exam_id == exam_id)
            .count() as u64;
        Ok(AttendanceCounts { issued, checked_in })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use crate::models::CheckInMethod;

    fn ticket(state: TicketState) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            exam_id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            amount: Decimal::new(25_000, 0),
            state,
            token_version: 0,
            issued_at: now,
            updated_at: now,
        }
    }

    fn event_for(t: &Ticket) -> CheckInEvent {
        CheckInEvent {
            id: Uuid::new_v4(),
            ticket_id: t.id,
            student_id: t.student_id,
            exam_id: t.exam_id,
            venue_id: t.venue_id,
            proctor_id: Uuid::new_v4(),
            method: CheckInMethod::Scanned,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn claim_succeeds_once_then_reports_already_checked_in() {
        let store = MemoryStore::new();
        let t = ticket(TicketState::Issued);
        store.insert_ticket(&t).await.unwrap();

        match store.claim_for_check_in(event_for(&t)).await.unwrap() {
            ClaimOutcome::Claimed(_) => {}
            other => panic!("expected Claimed, got {other:?}"),
        }
        assert!(matches!(
            store.claim_for_check_in(event_for(&t)).await.unwrap(),
            ClaimOutcome::AlreadyCheckedIn
        ));

        let (events, total) = store
            .list_events(EventFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn claim_rejects_terminal_states() {
        let store = MemoryStore::new();
        let t = ticket(TicketState::Void);
        // Bypass the duplicate check path by inserting directly
        store.insert_ticket(&t).await.unwrap();

        assert!(matches!(
            store.claim_for_check_in(event_for(&t)).await.unwrap(),
            ClaimOutcome::NotClaimable(TicketState::Void)
        ));
        assert!(matches!(
            store.claim_for_check_in(event_for(&ticket(TicketState::Issued))).await.unwrap(),
            ClaimOutcome::Missing
        ));
    }

    #[tokio::test]
    async fn duplicate_active_ticket_is_refused_until_void() {
        let store = MemoryStore::new();
        let t = ticket(TicketState::Issued);
        assert_eq!(
            store.insert_ticket(&t).await.unwrap(),
            TicketInsert::Inserted
        );

        let mut again = ticket(TicketState::Issued);
        again.student_id = t.student_id;
        again.exam_id = t.exam_id;
        assert_eq!(
            store.insert_ticket(&again).await.unwrap(),
            TicketInsert::DuplicateActive
        );

        assert!(store.transition_issued(t.id, TicketState::Void).await.unwrap());
        assert_eq!(
            store.insert_ticket(&again).await.unwrap(),
            TicketInsert::Inserted
        );
    }

    #[tokio::test]
    async fn events_are_listed_in_timestamp_order() {
        let store = MemoryStore::new();
        let exam_id = Uuid::new_v4();
        let base = Utc::now();

        for offset in [30i64, 10, 20] {
            let mut t = ticket(TicketState::Issued);
            t.exam_id = exam_id;
            store.insert_ticket(&t).await.unwrap();
            let mut e = event_for(&t);
            e.timestamp = base + chrono::Duration::seconds(offset);
            store.claim_for_check_in(e).await.unwrap();
        }

        let (events, total) = store
            .list_events(
                EventFilter {
                    exam_id: Some(exam_id),
                    venue_id: None,
                },
                Page::new(1, 10),
            )
            .await
            .unwrap();
        assert_eq!(total, 3);
        let stamps: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);
    }
}
