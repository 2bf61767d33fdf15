//! Attendance ledger reads. Appends happen only inside the check-in
//! transition; everything here is reporting over the recorded events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{CheckInEvent, Exam, TicketState};
use crate::store::{CheckInStore, EventFilter, Page, TicketFilter};
use crate::utils::error::AppError;
use crate::utils::response::Pagination;

/// Hard cap on the per-exam roster a report will enumerate.
const REPORT_ROSTER_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_issued: u64,
    pub total_checked_in: u64,
    pub no_shows: u64,
    pub attendance_rate: String,
}

impl AttendanceSummary {
    fn new(issued: u64, checked_in: u64) -> Self {
        let rate = if issued == 0 {
            0.0
        } else {
            checked_in as f64 * 100.0 / issued as f64
        };
        Self {
            total_issued: issued,
            total_checked_in: checked_in,
            no_shows: issued.saturating_sub(checked_in),
            attendance_rate: format!("{rate:.2}%"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckedInStudent {
    pub student_id: Uuid,
    pub ticket_id: Uuid,
    pub check_in_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoShowStudent {
    pub student_id: Uuid,
    pub ticket_id: Uuid,
    pub ticket_state: TicketState,
}

/// Attendance report for one exam, in the shape the registrar's dashboard
/// consumes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub exam_id: Uuid,
    pub exam_title: String,
    pub exam_date: DateTime<Utc>,
    #[serde(flatten)]
    pub summary: AttendanceSummary,
    pub checked_in_students: Vec<CheckedInStudent>,
    pub no_show_students: Vec<NoShowStudent>,
}

pub struct AttendanceLedger {
    store: Arc<dyn CheckInStore>,
}

impl AttendanceLedger {
    pub fn new(store: Arc<dyn CheckInStore>) -> Self {
        Self { store }
    }

    /// Check-in log, timestamp ascending.
    pub async fn log(
        &self,
        filter: EventFilter,
        page: Page,
    ) -> Result<(Vec<CheckInEvent>, Pagination), AppError> {
        let (events, total) = self.store.list_events(filter, page).await?;
        Ok((events, Pagination::new(page.page, page.limit, total)))
    }

    pub async fn summary(&self, exam_id: Uuid) -> Result<AttendanceSummary, AppError> {
        let counts = self.store.exam_attendance(exam_id).await?;
        Ok(AttendanceSummary::new(counts.issued, counts.checked_in))
    }

    pub async fn exam_report(&self, exam_id: Uuid) -> Result<AttendanceReport, AppError> {
        let exam: Exam = self
            .store
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("exam {exam_id}")))?;

        let counts = self.store.exam_attendance(exam_id).await?;

        let (events, _) = self
            .store
            .list_events(
                EventFilter {
                    exam_id: Some(exam_id),
                    venue_id: None,
                },
                Page::new(1, REPORT_ROSTER_LIMIT),
            )
            .await?;
        let checked_in_students = events
            .iter()
            .map(|e| CheckedInStudent {
                student_id: e.student_id,
                ticket_id: e.ticket_id,
                check_in_time: e.timestamp,
            })
            .collect();

        // No-show = a non-void ticket that never produced a check-in event,
        // which after lazy expiry means states ISSUED or EXPIRED.
        let (tickets, _) = self
            .store
            .list_tickets(
                TicketFilter {
                    exam_id: Some(exam_id),
                    ..TicketFilter::default()
                },
                Page::new(1, REPORT_ROSTER_LIMIT),
            )
            .await?;
        let no_show_students = tickets
            .iter()
            .filter(|t| matches!(t.state, TicketState::Issued | TicketState::Expired))
            .map(|t| NoShowStudent {
                student_id: t.student_id,
                ticket_id: t.id,
                ticket_state: t.state,
            })
            .collect();

        Ok(AttendanceReport {
            exam_id,
            exam_title: exam.title,
            exam_date: exam.scheduled_at,
            summary: AttendanceSummary::new(counts.issued, counts.checked_in),
            checked_in_students,
            no_show_students,
        })
    }
}
