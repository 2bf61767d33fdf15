use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// Failure body: `{success: false, message, details}`. Check-in rejections
/// carry `details.reason` so front-line staff can explain the outcome.
#[derive(Serialize)]
pub struct ApiFailure {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        Self {
            current_page: page.max(1),
            limit,
            total,
            pages: total.div_ceil(u64::from(limit)),
        }
    }
}

#[derive(Serialize)]
struct PaginatedResponse<T>
where
    T: Serialize,
{
    success: bool,
    data: Vec<T>,
    pagination: Pagination,
    message: String,
}

pub fn success<T>(data: T, message: impl Into<String>) -> impl IntoResponse
where
    T: Serialize,
{
    let body = ApiResponse {
        success: true,
        data: Some(data),
        message: Some(message.into()),
    };
    (StatusCode::OK, Json(body))
}

pub fn created<T>(data: T, message: impl Into<String>) -> impl IntoResponse
where
    T: Serialize,
{
    let body = ApiResponse {
        success: true,
        data: Some(data),
        message: Some(message.into()),
    };
    (StatusCode::CREATED, Json(body))
}

pub fn paginated<T>(
    data: Vec<T>,
    pagination: Pagination,
    message: impl Into<String>,
) -> impl IntoResponse
where
    T: Serialize,
{
    let body = PaginatedResponse {
        success: true,
        data,
        pagination,
        message: message.into(),
    };
    (StatusCode::OK, Json(body))
}

/// An expected check-in rejection: HTTP 400 with the machine-readable reason.
pub fn rejection(message: impl Into<String>, reason: &str) -> Response {
    failure(
        message,
        Some(json!({ "reason": reason })),
        StatusCode::BAD_REQUEST,
    )
}

pub fn failure(message: impl Into<String>, details: Option<Value>, status: StatusCode) -> Response {
    let body = ApiFailure {
        success: false,
        message: message.into(),
        details,
    };
    (status, Json(body)).into_response()
}
