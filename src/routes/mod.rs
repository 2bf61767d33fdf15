use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    checkins::{check_in_logs, exam_attendance, manual_check_in, venue_check_ins, verify_check_in},
    health_check,
    refdata::{create_exam, create_venue, get_exam, get_venue},
    tickets::{get_ticket, issue_ticket, list_tickets, reissue_ticket, void_ticket},
};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/tickets", post(issue_ticket).get(list_tickets))
        .route("/tickets/:id", get(get_ticket))
        .route("/tickets/:id/reissue", post(reissue_ticket))
        .route("/tickets/:id/void", post(void_ticket))
        .route("/check-ins/verify", post(verify_check_in))
        .route("/check-ins/manual", post(manual_check_in))
        .route("/check-ins/logs", get(check_in_logs))
        .route("/check-ins/exam/:exam_id", get(exam_attendance))
        .route("/check-ins/venue/:venue_id", get(venue_check_ins))
        .route("/exams", post(create_exam))
        .route("/exams/:id", get(get_exam))
        .route("/venues", post(create_venue))
        .route("/venues/:id", get(get_venue));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
