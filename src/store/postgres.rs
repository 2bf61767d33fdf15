//! Postgres store. The check-in test-and-set is a conditional UPDATE whose
//! row count decides the winner, with the ledger INSERT in the same
//! transaction; a partial unique index enforces the one-active-ticket rule.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CheckInEvent, Exam, Ticket, TicketState, Venue};

use super::{
    AttendanceCounts, CheckInStore, ClaimOutcome, EventFilter, Page, StoreError, TicketFilter,
    TicketInsert,
};

const TICKET_COLUMNS: &str =
    "id, exam_id, venue_id, student_id, amount, state, token_version, issued_at, updated_at";

const EVENT_COLUMNS: &str =
    "id, ticket_id, student_id, exam_id, venue_id, proctor_id, method, timestamp";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckInStore for PgStore {
    async fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO exams (id, title, course_id, scheduled_at, duration_minutes, fee, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(exam.id)
        .bind(&exam.title)
        .bind(exam.course_id)
        .bind(exam.scheduled_at)
        .bind(exam.duration_minutes)
        .bind(exam.fee)
        .bind(exam.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_exam(&self, id: Uuid) -> Result<Option<Exam>, StoreError> {
        let exam = sqlx::query_as::<_, Exam>(
            "SELECT id, title, course_id, scheduled_at, duration_minutes, fee, created_at \
             FROM exams WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exam)
    }

    async fn insert_venue(&self, venue: &Venue) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO venues (id, name, address, capacity, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(venue.id)
        .bind(&venue.name)
        .bind(&venue.address)
        .bind(venue.capacity)
        .bind(venue.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_venue(&self, id: Uuid) -> Result<Option<Venue>, StoreError> {
        let venue = sqlx::query_as::<_, Venue>(
            "SELECT id, name, address, capacity, created_at FROM venues WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(venue)
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<TicketInsert, StoreError> {
        let result = sqlx::query(
            "INSERT INTO tickets \
             (id, exam_id, venue_id, student_id, amount, state, token_version, issued_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(ticket.id)
        .bind(ticket.exam_id)
        .bind(ticket.venue_id)
        .bind(ticket.student_id)
        .bind(ticket.amount)
        .bind(ticket.state)
        .bind(ticket.token_version)
        .bind(ticket.issued_at)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(TicketInsert::Inserted),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(TicketInsert::DuplicateActive)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn list_tickets(
        &self,
        filter: TicketFilter,
        page: Page,
    ) -> Result<(Vec<Ticket>, u64), StoreError> {
        let clause = "($1::uuid IS NULL OR exam_id = $1) \
             AND ($2::uuid IS NULL OR venue_id = $2) \
             AND ($3::uuid IS NULL OR student_id = $3) \
             AND ($4::ticket_state IS NULL OR state = $4)";

        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE {clause} \
             ORDER BY issued_at ASC, id ASC LIMIT $5 OFFSET $6"
        ))
        .bind(filter.exam_id)
        .bind(filter.venue_id)
        .bind(filter.student_id)
        .bind(filter.state)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM tickets WHERE {clause}"
        ))
        .bind(filter.exam_id)
        .bind(filter.venue_id)
        .bind(filter.student_id)
        .bind(filter.state)
        .fetch_one(&self.pool)
        .await?;

        Ok((tickets, total as u64))
    }

    async fn bump_token_version(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "UPDATE tickets SET token_version = token_version + 1, updated_at = now() \
             WHERE id = $1 AND state = $2 RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .bind(TicketState::Issued)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn transition_issued(&self, id: Uuid, to: TicketState) -> Result<bool, StoreError> {
        if !to.is_terminal() {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE tickets SET state = $2, updated_at = now() \
             WHERE id = $1 AND state = $3",
        )
        .bind(id)
        .bind(to)
        .bind(TicketState::Issued)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_for_check_in(&self, event: CheckInEvent) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE tickets SET state = $2, updated_at = $3 WHERE id = $1 AND state = $4",
        )
        .bind(event.ticket_id)
        .bind(TicketState::CheckedIn)
        .bind(event.timestamp)
        .bind(TicketState::Issued)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 1 {
            sqlx::query(&format!(
                "INSERT INTO check_in_events ({EVENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(event.id)
            .bind(event.ticket_id)
            .bind(event.student_id)
            .bind(event.exam_id)
            .bind(event.venue_id)
            .bind(event.proctor_id)
            .bind(event.method)
            .bind(event.timestamp)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(ClaimOutcome::Claimed(event));
        }

        // Lost the race or the ticket was never claimable; report why.
        tx.rollback().await?;
        let state: Option<TicketState> =
            sqlx::query_scalar("SELECT state FROM tickets WHERE id = $1")
                .bind(event.ticket_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match state {
            None => ClaimOutcome::Missing,
            Some(TicketState::CheckedIn) => ClaimOutcome::AlreadyCheckedIn,
            Some(state) => ClaimOutcome::NotClaimable(state),
        })
    }

    async fn list_events(
        &self,
        filter: EventFilter,
        page: Page,
    ) -> Result<(Vec<CheckInEvent>, u64), StoreError> {
        let clause = "($1::uuid IS NULL OR exam_id = $1) AND ($2::uuid IS NULL OR venue_id = $2)";

        let events = sqlx::query_as::<_, CheckInEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM check_in_events WHERE {clause} \
             ORDER BY timestamp ASC, id ASC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.exam_id)
        .bind(filter.venue_id)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM check_in_events WHERE {clause}"
        ))
        .bind(filter.exam_id)
        .bind(filter.venue_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((events, total as u64))
    }

    async fn exam_attendance(&self, exam_id: Uuid) -> Result<AttendanceCounts, StoreError> {
        let issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE exam_id = $1 AND state <> $2",
        )
        .bind(exam_id)
        .bind(TicketState::Void)
        .fetch_one(&self.pool)
        .await?;

        let checked_in: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM check_in_events WHERE exam_id = $1")
                .bind(exam_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(AttendanceCounts {
            issued: issued as u64,
            checked_in: checked_in as u64,
        })
    }
}
