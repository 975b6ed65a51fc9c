use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use super::actor::idempotency_key;
use super::events::json_body;
use crate::models::{Actor, ReservationRequest};
use crate::services::TicketingEngine;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_reservation(
    State(engine): State<TicketingEngine>,
    actor: Actor,
    headers: HeaderMap,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let key = idempotency_key(&headers)?;
    let reservation = engine.create_reservation(&actor, request, key).await?;
    Ok(created(reservation, "Reservation confirmed"))
}

pub async fn my_reservations(
    State(engine): State<TicketingEngine>,
    actor: Actor,
) -> Result<Response, AppError> {
    let reservations = engine.get_reservations_for_user(actor.user_id).await?;
    Ok(success(reservations, "Reservations retrieved"))
}

pub async fn cancel_reservation(
    State(engine): State<TicketingEngine>,
    Path(reservation_id): Path<Uuid>,
    actor: Actor,
) -> Result<Response, AppError> {
    let reservation = engine.cancel_reservation(&actor, reservation_id).await?;
    Ok(success(reservation, "Reservation cancelled"))
}
