use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::TicketState;
use crate::state::AppState;
use crate::store::{Page, TicketFilter};
use crate::utils::error::AppError;
use crate::utils::response::{created, paginated, success, Pagination};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketRequest {
    pub exam_id: Uuid,
    pub student_id: Uuid,
    pub venue_id: Uuid,
}

/// POST /api/tickets
///
/// Called once the upstream payment/approval flow has completed for the
/// student's order.
pub async fn issue_ticket(
    State(state): State<AppState>,
    Json(req): Json<IssueTicketRequest>,
) -> Result<Response, AppError> {
    let issued = state
        .issuer
        .issue(req.exam_id, req.student_id, req.venue_id)
        .await?;
    Ok(created(issued, "Ticket issued successfully").into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketListQuery {
    pub exam_id: Option<Uuid>,
    pub venue_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<TicketState>,
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

/// GET /api/tickets
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketListQuery>,
) -> Result<Response, AppError> {
    let filter = TicketFilter {
        exam_id: query.exam_id,
        venue_id: query.venue_id,
        student_id: query.student_id,
        state: query.status,
    };
    let page = Page::new(query.page, query.limit);
    let (tickets, total) = state.store.list_tickets(filter, page).await?;

    Ok(paginated(
        tickets,
        Pagination::new(page.page, page.limit, total),
        "Tickets retrieved",
    )
    .into_response())
}

/// GET /api/tickets/:id
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket = state
        .store
        .get_ticket(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ticket {id}")))?;
    Ok(success(ticket, "Ticket retrieved").into_response())
}

/// POST /api/tickets/:id/reissue
///
/// Mints a replacement token; every previously issued token for this ticket
/// becomes stale.
pub async fn reissue_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let issued = state.issuer.reissue(id).await?;
    Ok(success(issued, "Ticket token reissued").into_response())
}

/// POST /api/tickets/:id/void
pub async fn void_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let ticket = state.issuer.void(id).await?;
    Ok(success(ticket, "Ticket voided").into_response())
}
