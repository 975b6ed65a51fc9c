use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, with_security_headers, Config};
use crate::handlers::{events, health_check, reservations, tickets};
use crate::services::TicketingEngine;

pub fn create_routes(engine: TicketingEngine, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        // Events
        .route("/events", post(events::create_event))
        .route(
            "/events/:event_id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:event_id/status", patch(events::update_event_status))
        .route("/events/:event_id/zones", get(events::zone_fills))
        .route("/events/:event_id/tickets", get(events::list_event_tickets))
        // Reservations
        .route("/reservations", post(reservations::create_reservation))
        .route("/reservations/me", get(reservations::my_reservations))
        .route(
            "/reservations/:reservation_id",
            delete(reservations::cancel_reservation),
        )
        // Tickets
        .route("/tickets/me", get(tickets::my_tickets))
        .route("/tickets/code/:code", get(tickets::ticket_by_code))
        .route("/tickets/validate", post(tickets::validate_ticket))
        .with_state(engine);

    with_security_headers(router, config.production)
        .layer(create_cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
}
