use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use super::ledger::CapacityLedger;
use super::reservations::{ReservationService, DEFAULT_MAX_PARTICIPANTS};
use super::scheduler::EventScheduler;
use super::validation::{TicketValidator, DEFAULT_VALIDATION_LEAD_MINUTES};
use crate::collaborators::{AuthorizationGate, StructureMembershipGate, TicketDelivery};
use crate::models::{
    Actor, Area, AudienceZoneTemplate, Event, EventDraft, EventStatus, Page, Reservation,
    ReservationRequest, Ticket, TicketFilter, TicketView, ValidationResult, ZoneFill,
};
use crate::storage::StorageBackend;
use crate::utils::{AppError, Clock, RetryPolicy};

/// Tunables shared by the engine's services.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_participants: usize,
    /// How long before an event starts the doors may scan tickets.
    pub validation_lead: Duration,
    pub transient_retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            validation_lead: Duration::minutes(DEFAULT_VALIDATION_LEAD_MINUTES),
            transient_retry: RetryPolicy::transient(),
        }
    }
}

/// Entry point for every engine operation; cheap to clone into handlers.
#[derive(Clone)]
pub struct TicketingEngine {
    storage: StorageBackend,
    scheduler: Arc<EventScheduler>,
    ledger: Arc<CapacityLedger>,
    reservations: Arc<ReservationService>,
    validator: Arc<TicketValidator>,
}

impl TicketingEngine {
    pub fn new(
        storage: StorageBackend,
        clock: Arc<dyn Clock>,
        gate: Arc<dyn AuthorizationGate>,
        delivery: TicketDelivery,
        settings: &EngineSettings,
    ) -> Self {
        let retry = settings.transient_retry.clone();
        Self {
            scheduler: Arc::new(EventScheduler::new(
                storage.clone(),
                gate.clone(),
                clock.clone(),
                retry.clone(),
            )),
            ledger: Arc::new(CapacityLedger::new(storage.clone())),
            reservations: Arc::new(ReservationService::new(
                storage.clone(),
                clock.clone(),
                retry.clone(),
                delivery,
                settings.max_participants,
            )),
            validator: Arc::new(TicketValidator::new(
                storage.clone(),
                gate,
                clock,
                retry,
                settings.validation_lead,
            )),
            storage,
        }
    }

    /// In-memory engine with membership-based staff checks and no delivery.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            StorageBackend::in_memory(),
            clock,
            Arc::new(StructureMembershipGate),
            TicketDelivery::disabled(),
            &EngineSettings::default(),
        )
    }

    pub fn storage(&self) -> &StorageBackend {
        &self.storage
    }

    // ============================================
    // Venue topology (owned by venue management)
    // ============================================

    pub async fn register_area(&self, area: Area) -> Result<Area, AppError> {
        self.storage.upsert_area(area).await
    }

    pub async fn register_template(
        &self,
        template: AudienceZoneTemplate,
    ) -> Result<AudienceZoneTemplate, AppError> {
        if template.max_capacity == 0 {
            return Err(AppError::ValidationError(
                "Template capacity must be positive".into(),
            ));
        }
        self.storage.upsert_template(template).await
    }

    // ============================================
    // Events
    // ============================================

    pub async fn create_or_update_event(
        &self,
        actor: &Actor,
        event_id: Option<Uuid>,
        draft: EventDraft,
    ) -> Result<Event, AppError> {
        self.scheduler
            .create_or_update_event(actor, event_id, draft)
            .await
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Event, AppError> {
        self.scheduler.get_event(event_id).await
    }

    pub async fn update_event_status(
        &self,
        actor: &Actor,
        event_id: Uuid,
        status: EventStatus,
    ) -> Result<Event, AppError> {
        self.scheduler.update_status(actor, event_id, status).await
    }

    pub async fn delete_event(&self, actor: &Actor, event_id: Uuid) -> Result<(), AppError> {
        self.scheduler.delete_event(actor, event_id).await
    }

    pub async fn zone_fills(&self, event_id: Uuid) -> Result<Vec<ZoneFill>, AppError> {
        self.ledger.zone_fills(event_id).await
    }

    pub async fn remaining_capacity(&self, event_id: Uuid, zone_id: Uuid) -> Result<u32, AppError> {
        self.ledger.remaining(event_id, zone_id).await
    }

    // ============================================
    // Reservations
    // ============================================

    pub async fn create_reservation(
        &self,
        actor: &Actor,
        request: ReservationRequest,
        idempotency_key: Option<String>,
    ) -> Result<Reservation, AppError> {
        self.reservations
            .create_reservation(actor, request, idempotency_key)
            .await
    }

    pub async fn cancel_reservation(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
    ) -> Result<Reservation, AppError> {
        self.reservations
            .cancel_reservation(actor, reservation_id)
            .await
    }

    pub async fn get_reservations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Reservation>, AppError> {
        self.reservations.reservations_for_user(user_id).await
    }

    // ============================================
    // Tickets
    // ============================================

    pub async fn get_tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        self.reservations.tickets_for_user(user_id).await
    }

    pub async fn get_ticket_by_code(&self, code: &str) -> Result<TicketView, AppError> {
        self.reservations.ticket_by_code(code).await
    }

    pub async fn validate_ticket(
        &self,
        redemption_code: &str,
        actor: &Actor,
    ) -> Result<ValidationResult, AppError> {
        self.validator.validate_ticket(redemption_code, actor).await
    }

    pub async fn list_event_tickets(
        &self,
        actor: &Actor,
        event_id: Uuid,
        filter: &TicketFilter,
    ) -> Result<Page<Ticket>, AppError> {
        self.validator
            .list_event_tickets(actor, event_id, filter)
            .await
    }

    pub async fn expire_ended_tickets(&self) -> Result<u64, AppError> {
        self.validator.expire_ended_tickets().await
    }
}
