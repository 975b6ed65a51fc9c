use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{ConflictingEvent, TicketStatus};
use crate::utils::response::error as error_response;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
/// Two submissions racing with the same idempotency key; the retry replays
/// the winner.
const IDEMPOTENCY_KEY_CONSTRAINT: &str = "reservations_user_id_idempotency_key_key";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not bookable: {0}")]
    NotPublished(String),

    #[error("Schedule conflict with {} event(s)", .conflicts.len())]
    Conflict { conflicts: Vec<ConflictingEvent> },

    #[error("Insufficient capacity in zone {zone_id}: requested {requested}, remaining {remaining}")]
    InsufficientCapacity {
        zone_id: Uuid,
        requested: u32,
        remaining: u32,
    },

    #[error("Ticket {ticket_id} is {status}")]
    StateConflict {
        ticket_id: Uuid,
        status: TicketStatus,
        validated_at: Option<DateTime<Utc>>,
    },

    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    #[error("Database error")]
    DatabaseError(sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let transient = err
            .as_database_error()
            .and_then(|db| {
                db.code()
                    .map(|code| is_transient_db_error(&code, db.constraint()))
            })
            .unwrap_or(false);

        if transient {
            AppError::TransientConflict(err.to_string())
        } else {
            AppError::DatabaseError(err)
        }
    }
}

fn is_transient_db_error(code: &str, constraint: Option<&str>) -> bool {
    match code {
        SERIALIZATION_FAILURE | DEADLOCK_DETECTED => true,
        UNIQUE_VIOLATION => constraint == Some(IDEMPOTENCY_KEY_CONSTRAINT),
        _ => false,
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotPublished(_)
            | AppError::Conflict { .. }
            | AppError::InsufficientCapacity { .. }
            | AppError::StateConflict { .. } => StatusCode::CONFLICT,
            AppError::TransientConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotPublished(_) => "NOT_BOOKABLE",
            AppError::Conflict { .. } => "SCHEDULE_CONFLICT",
            AppError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            AppError::StateConflict { .. } => "TICKET_STATE_CONFLICT",
            AppError::TransientConflict(_) => "TRANSIENT_CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Only serialization conflicts may be retried automatically.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientConflict(_))
    }

    /// Structured payload for errors the caller has to act on.
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Conflict { conflicts } => Some(json!({ "conflicting_events": conflicts })),
            AppError::InsufficientCapacity {
                zone_id,
                requested,
                remaining,
            } => Some(json!({
                "zone_id": zone_id,
                "requested": requested,
                "remaining": remaining,
            })),
            AppError::StateConflict {
                ticket_id,
                status,
                validated_at,
            } => Some(json!({
                "ticket_id": ticket_id,
                "status": status,
                "validated_at": validated_at,
            })),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::NotPublished(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
            AppError::Conflict { .. }
            | AppError::InsufficientCapacity { .. }
            | AppError::StateConflict { .. } => self.to_string(),
            AppError::TransientConflict(_) => {
                "The request conflicted with another one, please retry".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::TransientConflict(msg) => {
                warn!(message = %msg, "Transient conflict surfaced to client");
            }
            _ => {
                warn!(code = self.code(), message = %self, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
