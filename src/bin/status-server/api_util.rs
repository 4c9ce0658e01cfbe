use audioflux_status::{iso8601, ServiceStatus, Status, StatusSnapshot, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{error::Error, fmt::Display};
use tracing::error;

pub const CRON_SUCCESS_MESSAGE: &str = "Health check completed successfully";

#[derive(Serialize)]
pub struct CronReport {
    pub success: bool,
    pub status: StatusSnapshot,
    pub message: &'static str,
}

impl CronReport {
    pub fn new(status: StatusSnapshot) -> Self {
        Self {
            success: true,
            status,
            message: CRON_SUCCESS_MESSAGE,
        }
    }
}

/// Failure of `GET /api/status`. Answers with an empty, `down` snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StatusError(pub StoreError);

impl From<StoreError> for StatusError {
    fn from(value: StoreError) -> Self {
        Self(value)
    }
}

impl Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for StatusError {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusErrorBody {
    services: Vec<ServiceStatus>,
    overall_status: Status,
    #[serde(serialize_with = "iso8601")]
    last_checked: DateTime<Utc>,
    error: String,
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        error!(error = %self, "Failed to serve status");
        let body = StatusErrorBody {
            services: Vec::new(),
            overall_status: Status::Down,
            last_checked: Utc::now(),
            error: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Failure of `GET /api/cron/health-check`.
#[derive(Debug, Clone, Copy)]
pub struct CronError(pub StoreError);

impl From<StoreError> for CronError {
    fn from(value: StoreError) -> Self {
        Self(value)
    }
}

impl Display for CronError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for CronError {}

#[derive(Serialize)]
struct CronErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for CronError {
    fn into_response(self) -> Response {
        error!(error = %self, "Scheduled health check failed");
        let body = CronErrorBody {
            success: false,
            error: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
