use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use super::events::json_body;
use crate::models::Actor;
use crate::services::TicketingEngine;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    pub redemption_code: String,
}

pub async fn my_tickets(
    State(engine): State<TicketingEngine>,
    actor: Actor,
) -> Result<Response, AppError> {
    let tickets = engine.get_tickets_for_user(actor.user_id).await?;
    Ok(success(tickets, "Tickets retrieved"))
}

pub async fn ticket_by_code(
    State(engine): State<TicketingEngine>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let ticket = engine.get_ticket_by_code(&code).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn validate_ticket(
    State(engine): State<TicketingEngine>,
    actor: Actor,
    payload: Result<Json<ValidateTicketRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let result = engine
        .validate_ticket(&request.redemption_code, &actor)
        .await?;
    Ok(success(result, "Ticket validated"))
}
