use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CheckInMethod, TicketState};
use crate::services::checkin::CheckInOutcome;
use crate::services::ledger::AttendanceSummary;
use crate::state::AppState;
use crate::store::{EventFilter, Page};
use crate::utils::error::AppError;
use crate::utils::response::{paginated, rejection, success, Pagination};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// The payload read out of the scannable code, or typed in by hand.
    pub token: String,
    pub venue_id: Uuid,
    /// Authenticated upstream; trusted here.
    pub proctor_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckInAccepted {
    ticket_id: Uuid,
    student_id: Uuid,
    exam_id: Uuid,
    venue_id: Uuid,
    check_in_id: Uuid,
    check_in_time: DateTime<Utc>,
    method: CheckInMethod,
    status: TicketState,
}

async fn run_check_in(
    state: &AppState,
    req: CheckInRequest,
    method: CheckInMethod,
) -> Result<Response, AppError> {
    let outcome = state
        .checkin
        .check_in(&req.token, req.venue_id, req.proctor_id, method)
        .await?;

    match outcome {
        CheckInOutcome::Accepted { ticket, event } => {
            let payload = CheckInAccepted {
                ticket_id: ticket.id,
                student_id: ticket.student_id,
                exam_id: ticket.exam_id,
                venue_id: event.venue_id,
                check_in_id: event.id,
                check_in_time: event.timestamp,
                method: event.method,
                status: ticket.state,
            };
            Ok(success(payload, "Student checked in successfully").into_response())
        }
        CheckInOutcome::Rejected(reason) => Ok(rejection(reason.message(), reason.code())),
    }
}

/// POST /api/check-ins/verify — proctor device scanned the code.
pub async fn verify_check_in(
    State(state): State<AppState>,
    Json(req): Json<CheckInRequest>,
) -> Result<Response, AppError> {
    run_check_in(&state, req, CheckInMethod::Scanned).await
}

/// POST /api/check-ins/manual — code keyed in by hand (damaged printout,
/// dead phone screen). Same verification path, different audit trail.
pub async fn manual_check_in(
    State(state): State<AppState>,
    Json(req): Json<CheckInRequest>,
) -> Result<Response, AppError> {
    run_check_in(&state, req, CheckInMethod::Manual).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub exam_id: Option<Uuid>,
    pub venue_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogsPayload {
    events: Vec<crate::models::CheckInEvent>,
    pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<AttendanceSummary>,
}

/// GET /api/check-ins/logs
pub async fn check_in_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, AppError> {
    let filter = EventFilter {
        exam_id: query.exam_id,
        venue_id: query.venue_id,
    };
    let page = Page::new(query.page, query.limit);
    let (events, pagination) = state.ledger.log(filter, page).await?;

    // Attendance totals only make sense scoped to one exam
    let summary = match query.exam_id {
        Some(exam_id) => Some(state.ledger.summary(exam_id).await?),
        None => None,
    };

    let payload = LogsPayload {
        events,
        pagination,
        summary,
    };
    Ok(success(payload, "Check-in logs retrieved").into_response())
}

/// GET /api/check-ins/exam/:examId
pub async fn exam_attendance(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let report = state.ledger.exam_report(exam_id).await?;
    Ok(success(report, "Exam attendance report").into_response())
}

#[derive(Deserialize)]
pub struct VenueLogQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// GET /api/check-ins/venue/:venueId
pub async fn venue_check_ins(
    State(state): State<AppState>,
    Path(venue_id): Path<Uuid>,
    Query(query): Query<VenueLogQuery>,
) -> Result<Response, AppError> {
    let filter = EventFilter {
        exam_id: None,
        venue_id: Some(venue_id),
    };
    let page = Page::new(query.page, query.limit);
    let (events, pagination) = state.ledger.log(filter, page).await?;
    Ok(paginated(events, pagination, "Venue check-in logs retrieved").into_response())
}
