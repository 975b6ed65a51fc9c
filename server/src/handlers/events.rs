use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Actor, EventDraft, EventStatus, TicketFilter};
use crate::services::TicketingEngine;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: EventStatus,
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

pub async fn create_event(
    State(engine): State<TicketingEngine>,
    actor: Actor,
    payload: Result<Json<EventDraft>, JsonRejection>,
) -> Result<Response, AppError> {
    let draft = json_body(payload)?;
    let event = engine.create_or_update_event(&actor, None, draft).await?;
    Ok(created(event, "Event created"))
}

pub async fn update_event(
    State(engine): State<TicketingEngine>,
    Path(event_id): Path<Uuid>,
    actor: Actor,
    payload: Result<Json<EventDraft>, JsonRejection>,
) -> Result<Response, AppError> {
    let draft = json_body(payload)?;
    let event = engine
        .create_or_update_event(&actor, Some(event_id), draft)
        .await?;
    Ok(success(event, "Event updated"))
}

pub async fn get_event(
    State(engine): State<TicketingEngine>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = engine.get_event(event_id).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn update_event_status(
    State(engine): State<TicketingEngine>,
    Path(event_id): Path<Uuid>,
    actor: Actor,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Response, AppError> {
    let change = json_body(payload)?;
    let event = engine
        .update_event_status(&actor, event_id, change.status)
        .await?;
    Ok(success(event, format!("Event is now {}", event_status_label(&change.status))))
}

fn event_status_label(status: &EventStatus) -> &'static str {
    match status {
        EventStatus::Draft => "a draft",
        EventStatus::Published => "published",
        EventStatus::Cancelled => "cancelled",
    }
}

pub async fn delete_event(
    State(engine): State<TicketingEngine>,
    Path(event_id): Path<Uuid>,
    actor: Actor,
) -> Result<Response, AppError> {
    engine.delete_event(&actor, event_id).await?;
    Ok(empty_success("Event deleted"))
}

pub async fn zone_fills(
    State(engine): State<TicketingEngine>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let fills = engine.zone_fills(event_id).await?;
    Ok(success(fills, "Zone capacity retrieved"))
}

pub async fn list_event_tickets(
    State(engine): State<TicketingEngine>,
    Path(event_id): Path<Uuid>,
    actor: Actor,
    Query(filter): Query<TicketFilter>,
) -> Result<Response, AppError> {
    let page = engine.list_event_tickets(&actor, event_id, &filter).await?;
    Ok(success(page, "Tickets retrieved"))
}
