use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::services::TicketingEngine;
use crate::utils::response::success;

pub mod actor;
pub mod events;
pub mod reservations;
pub mod tickets;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    storage: &'static str,
}

pub async fn health_check(State(engine): State<TicketingEngine>) -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "tickly-api",
        storage: if engine.storage().is_in_memory() {
            "memory"
        } else {
            "postgres"
        },
    };

    success(payload, "Health check successful")
}
