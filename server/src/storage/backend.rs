// Storage backend abstraction
// Decision: enum dispatch over trait objects; `schedule_event` is generic
// over the planning closure, which a dyn trait could not express.
//
// Every method that mutates capacity or ticket status is atomic on its own;
// services compose them with a retry policy, never with an outer transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::memory::InMemoryStore;
use super::postgres::PgStore;
use crate::models::{
    Area, AudienceZoneTemplate, Event, EventStatus, Reservation, ReserveOutcome, TemplateRef,
    Ticket, ZoneFill,
};
use crate::utils::AppError;

#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(PgStore),
    /// In-memory store (dev mode and tests)
    InMemory(Arc<InMemoryStore>),
}

impl StorageBackend {
    pub async fn postgres(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let store = PgStore::connect(database_url, max_connections).await?;
        Ok(Self::Postgres(store))
    }

    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryStore::new()))
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Applies pending schema migrations. A no-op for the in-memory store.
    pub async fn migrate(&self) -> Result<(), AppError> {
        match self {
            Self::Postgres(db) => db.migrate().await,
            Self::InMemory(_) => Ok(()),
        }
    }

    // ============================================
    // Venue topology
    // ============================================

    pub async fn upsert_area(&self, area: Area) -> Result<Area, AppError> {
        match self {
            Self::Postgres(db) => db.upsert_area(area).await,
            Self::InMemory(db) => db.upsert_area(area).await,
        }
    }

    pub async fn upsert_template(
        &self,
        template: AudienceZoneTemplate,
    ) -> Result<AudienceZoneTemplate, AppError> {
        match self {
            Self::Postgres(db) => db.upsert_template(template).await,
            Self::InMemory(db) => db.upsert_template(template).await,
        }
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateRef>, AppError> {
        match self {
            Self::Postgres(db) => db.get_template(template_id).await,
            Self::InMemory(db) => db.get_template(template_id).await,
        }
    }

    // ============================================
    // Events
    // ============================================

    /// Runs `plan` against the stored event (when `event_id` is given) while
    /// scheduling for `structure_id` is serialized, rejects the planned event
    /// if it collides with another one, and persists it with its zones.
    pub async fn schedule_event<F>(
        &self,
        structure_id: Uuid,
        event_id: Option<Uuid>,
        plan: F,
    ) -> Result<Event, AppError>
    where
        F: FnOnce(Option<Event>) -> Result<Event, AppError> + Send,
    {
        match self {
            Self::Postgres(db) => db.schedule_event(structure_id, event_id, plan).await,
            Self::InMemory(db) => db.schedule_event(structure_id, event_id, plan).await,
        }
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, AppError> {
        match self {
            Self::Postgres(db) => db.get_event(event_id).await,
            Self::InMemory(db) => db.get_event(event_id).await,
        }
    }

    /// Compare-and-set on the event status. A status other than `from`
    /// surfaces as a transient conflict so the caller re-reads and re-decides.
    pub async fn transition_event_status(
        &self,
        event_id: Uuid,
        from: EventStatus,
        to: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        match self {
            Self::Postgres(db) => db.transition_event_status(event_id, from, to, at).await,
            Self::InMemory(db) => db.transition_event_status(event_id, from, to, at).await,
        }
    }

    pub async fn soft_delete_draft_event(
        &self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self {
            Self::Postgres(db) => db.soft_delete_draft_event(event_id, at).await,
            Self::InMemory(db) => db.soft_delete_draft_event(event_id, at).await,
        }
    }

    // ============================================
    // Capacity and reservations
    // ============================================

    /// Admits and persists `pending` against one zone, or replays the
    /// reservation already stored under the same idempotency key.
    pub async fn reserve(
        &self,
        pending: Reservation,
        event_id: Uuid,
        zone_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, AppError> {
        match self {
            Self::Postgres(db) => db.reserve(pending, event_id, zone_id, now).await,
            Self::InMemory(db) => db.reserve(pending, event_id, zone_id, now).await,
        }
    }

    pub async fn zone_fills(&self, event: &Event) -> Result<Vec<ZoneFill>, AppError> {
        match self {
            Self::Postgres(db) => db.zone_fills(event).await,
            Self::InMemory(db) => db.zone_fills(event).await,
        }
    }

    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, AppError> {
        match self {
            Self::Postgres(db) => db.get_reservation(reservation_id).await,
            Self::InMemory(db) => db.get_reservation(reservation_id).await,
        }
    }

    pub async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, AppError> {
        match self {
            Self::Postgres(db) => db.reservations_for_user(user_id).await,
            Self::InMemory(db) => db.reservations_for_user(user_id).await,
        }
    }

    /// Moves every ticket of the reservation from VALID to CANCELLED and
    /// releases their capacity, or changes nothing.
    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Reservation, AppError> {
        match self {
            Self::Postgres(db) => db.cancel_reservation(reservation_id, at).await,
            Self::InMemory(db) => db.cancel_reservation(reservation_id, at).await,
        }
    }

    // ============================================
    // Tickets
    // ============================================

    pub async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, AppError> {
        match self {
            Self::Postgres(db) => db.get_ticket_by_code(code).await,
            Self::InMemory(db) => db.get_ticket_by_code(code).await,
        }
    }

    pub async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        match self {
            Self::Postgres(db) => db.tickets_for_user(user_id).await,
            Self::InMemory(db) => db.tickets_for_user(user_id).await,
        }
    }

    /// All tickets of an event, ordered by holder name.
    pub async fn tickets_for_event(&self, event_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        match self {
            Self::Postgres(db) => db.tickets_for_event(event_id).await,
            Self::InMemory(db) => db.tickets_for_event(event_id).await,
        }
    }

    /// Conditional VALID -> USED. A ticket in any other status yields
    /// [`AppError::StateConflict`] carrying that status.
    pub async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, AppError> {
        match self {
            Self::Postgres(db) => db.mark_ticket_used(ticket_id, at).await,
            Self::InMemory(db) => db.mark_ticket_used(ticket_id, at).await,
        }
    }

    /// Moves VALID tickets of events that ended at or before `now` to
    /// EXPIRED. Returns how many tickets changed.
    pub async fn expire_ended_tickets(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        match self {
            Self::Postgres(db) => db.expire_ended_tickets(now).await,
            Self::InMemory(db) => db.expire_ended_tickets(now).await,
        }
    }
}
