//! Exam and venue reference data. The check-in flow only reads these; the
//! registrar creates them ahead of the exam session.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Exam, Venue};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

const MAX_EXAM_DURATION_MINUTES: i32 = 12 * 60;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    pub title: String,
    pub course_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub fee: Decimal,
}

/// POST /api/exams
pub async fn create_exam(
    State(state): State<AppState>,
    Json(req): Json<CreateExamRequest>,
) -> Result<Response, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("exam title must not be empty".into()));
    }
    if req.duration_minutes <= 0 || req.duration_minutes > MAX_EXAM_DURATION_MINUTES {
        return Err(AppError::Validation(format!(
            "duration must be between 1 and {MAX_EXAM_DURATION_MINUTES} minutes"
        )));
    }
    if req.fee.is_sign_negative() {
        return Err(AppError::Validation("fee must not be negative".into()));
    }

    let exam = Exam {
        id: Uuid::new_v4(),
        title: req.title,
        course_id: req.course_id,
        scheduled_at: req.scheduled_at,
        duration_minutes: req.duration_minutes,
        fee: req.fee,
        created_at: Utc::now(),
    };
    state.store.insert_exam(&exam).await?;

    Ok(created(exam, "Exam created successfully").into_response())
}

/// GET /api/exams/:id
pub async fn get_exam(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let exam = state
        .store
        .get_exam(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("exam {id}")))?;
    Ok(success(exam, "Exam retrieved").into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVenueRequest {
    pub name: String,
    pub address: Option<String>,
    pub capacity: i32,
}

/// POST /api/venues
pub async fn create_venue(
    State(state): State<AppState>,
    Json(req): Json<CreateVenueRequest>,
) -> Result<Response, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("venue name must not be empty".into()));
    }
    if req.capacity <= 0 {
        return Err(AppError::Validation("capacity must be positive".into()));
    }

    let venue = Venue {
        id: Uuid::new_v4(),
        name: req.name,
        address: req.address,
        capacity: req.capacity,
        created_at: Utc::now(),
    };
    state.store.insert_venue(&venue).await?;

    Ok(created(venue, "Venue created successfully").into_response())
}

/// GET /api/venues/:id
pub async fn get_venue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let venue = state
        .store
        .get_venue(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("venue {id}")))?;
    Ok(success(venue, "Venue retrieved").into_response())
}
