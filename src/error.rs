// src/error.rs
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::coordinator::VALID_MONTHS;

/// Synchronous rejections of a scrape trigger.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Scraping already in progress")]
    AlreadyRunning { current_month: Option<String> },

    #[error("Invalid month: {0}")]
    InvalidMonth(String),
}

impl TriggerError {
    fn status_code(&self) -> StatusCode {
        match self {
            TriggerError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            TriggerError::InvalidMonth(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = match &self {
            TriggerError::AlreadyRunning { current_month } => json!({
                "error": self.to_string(),
                "current_month": current_month,
            }),
            TriggerError::InvalidMonth(_) => json!({
                "error": self.to_string(),
                "valid_months": VALID_MONTHS,
            }),
        };
        (code, Json(body)).into_response()
    }
}
