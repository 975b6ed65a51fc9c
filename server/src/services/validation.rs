//! Ticket Validation: the door-side state machine.
//!
//! Checks run in a fixed order: authorization, then the event's time window,
//! then the atomic `VALID -> USED` transition in storage.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::AuthorizationGate;
use crate::models::{Actor, EventStatus, Page, Ticket, TicketFilter, ValidationResult};
use crate::storage::StorageBackend;
use crate::utils::codes;
use crate::utils::{AppError, Clock, RetryPolicy};

pub const DEFAULT_VALIDATION_LEAD_MINUTES: i64 = 60;

pub struct TicketValidator {
    storage: StorageBackend,
    gate: Arc<dyn AuthorizationGate>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    lead: Duration,
}

impl TicketValidator {
    pub fn new(
        storage: StorageBackend,
        gate: Arc<dyn AuthorizationGate>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        lead: Duration,
    ) -> Self {
        Self {
            storage,
            gate,
            clock,
            retry,
            lead,
        }
    }

    pub async fn validate_ticket(
        &self,
        redemption_code: &str,
        actor: &Actor,
    ) -> Result<ValidationResult, AppError> {
        let not_found = || AppError::NotFound("No ticket matches this code".to_string());
        let code = codes::normalize(redemption_code).ok_or_else(not_found)?;
        let ticket = self
            .storage
            .get_ticket_by_code(code)
            .await?
            .ok_or_else(not_found)?;
        let event = self
            .storage
            .get_event(ticket.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", ticket.event_id)))?;

        if !self.gate.is_staff_of(event.structure_id, actor).await {
            warn!(
                ticket_id = %ticket.id,
                actor_id = %actor.user_id,
                structure_id = %event.structure_id,
                "Validation refused for non-staff actor"
            );
            return Err(AppError::Forbidden(
                "You are not allowed to validate tickets for this event".into(),
            ));
        }

        if event.deleted || event.status == EventStatus::Cancelled {
            return Err(AppError::NotPublished(format!(
                "Event '{}' has been cancelled",
                event.name
            )));
        }
        let now = self.clock.now();
        if event.has_ended(now) {
            return Err(AppError::ValidationError(format!(
                "Event '{}' has ended",
                event.name
            )));
        }
        let opens_at = event.start_time - self.lead;
        if now < opens_at {
            return Err(AppError::ValidationError(format!(
                "Validation for '{}' opens at {}",
                event.name,
                opens_at.to_rfc3339()
            )));
        }

        let storage = &self.storage;
        let ticket_id = ticket.id;
        let used = self
            .retry
            .run("validate_ticket", move || async move {
                storage.mark_ticket_used(ticket_id, now).await
            })
            .await?;

        info!(
            ticket_id = %used.id,
            event_id = %used.event_id,
            validator = %actor.user_id,
            "Ticket validated"
        );
        Ok(ValidationResult {
            ticket_id: used.id,
            event_id: used.event_id,
            status: used.status,
            validated_at: used.validated_at.unwrap_or(now),
            participant: used.participant,
        })
    }

    /// Staff listing of an event's tickets with filtering and pagination.
    pub async fn list_event_tickets(
        &self,
        actor: &Actor,
        event_id: Uuid,
        filter: &TicketFilter,
    ) -> Result<Page<Ticket>, AppError> {
        let event = self
            .storage
            .get_event(event_id)
            .await?
            .filter(|event| !event.deleted)
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        if !self.gate.is_staff_of(event.structure_id, actor).await {
            return Err(AppError::Forbidden(
                "You are not allowed to list tickets for this event".into(),
            ));
        }

        let matching: Vec<Ticket> = self
            .storage
            .tickets_for_event(event_id)
            .await?
            .into_iter()
            .filter(|ticket| filter.accepts(ticket))
            .collect();
        debug!(event_id = %event_id, matching = matching.len(), "Listed event tickets");
        Ok(Page::from_filtered(matching, filter.page, filter.page_size()))
    }

    /// Expires VALID tickets of every event that has ended by now.
    pub async fn expire_ended_tickets(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let storage = &self.storage;
        let expired = self
            .retry
            .run("expire_ended_tickets", move || async move {
                storage.expire_ended_tickets(now).await
            })
            .await?;
        if expired > 0 {
            info!(expired, "Expired tickets of ended events");
        }
        Ok(expired)
    }
}
