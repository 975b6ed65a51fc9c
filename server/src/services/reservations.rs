//! Reservation & Ticket Issuance.
//!
//! A booking is prepared in full (ids, codes, participant snapshots) before
//! the storage backend admits and persists it in one atomic step. Delivery
//! of the documents happens afterwards and is best effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{DeliveryJob, TicketDelivery};
use crate::models::{
    Actor, Participant, Reservation, ReservationRequest, ReserveOutcome, Ticket, TicketStatus,
    TicketView,
};
use crate::storage::StorageBackend;
use crate::utils::codes::{self, generate_redemption_code};
use crate::utils::{AppError, Clock, RetryPolicy};

pub const DEFAULT_MAX_PARTICIPANTS: usize = 4;
const MAX_NAME_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 255;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

pub struct ReservationService {
    storage: StorageBackend,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    delivery: TicketDelivery,
    max_participants: usize,
}

impl ReservationService {
    pub fn new(
        storage: StorageBackend,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        delivery: TicketDelivery,
        max_participants: usize,
    ) -> Self {
        Self {
            storage,
            clock,
            retry,
            delivery,
            max_participants: max_participants.max(1),
        }
    }

    pub async fn create_reservation(
        &self,
        actor: &Actor,
        request: ReservationRequest,
        idempotency_key: Option<String>,
    ) -> Result<Reservation, AppError> {
        validate_participants(&request.participants, self.max_participants)?;
        let idempotency_key = normalize_idempotency_key(idempotency_key)?;

        let now = self.clock.now();
        let pending = prepare_reservation(actor.user_id, &request, idempotency_key, now);

        let storage = &self.storage;
        let pending = &pending;
        let (event_id, zone_id) = (request.event_id, request.audience_zone_id);
        let outcome = self
            .retry
            .run("reserve", move || async move {
                storage
                    .reserve(pending.clone(), event_id, zone_id, now)
                    .await
            })
            .await?;

        match outcome {
            ReserveOutcome::Created(reservation) => {
                info!(
                    reservation_id = %reservation.id,
                    user_id = %actor.user_id,
                    event_id = %event_id,
                    zone_id = %zone_id,
                    tickets = reservation.tickets.len(),
                    "Reservation created"
                );
                for job in delivery_jobs(actor, &request.participants, &reservation) {
                    self.delivery.enqueue(job);
                }
                Ok(reservation)
            }
            ReserveOutcome::Replayed(reservation) => {
                let same_target = reservation
                    .tickets
                    .iter()
                    .all(|ticket| ticket.event_id == event_id && ticket.audience_zone_id == zone_id);
                if !same_target {
                    return Err(AppError::ValidationError(
                        "Idempotency key was already used for a different booking".into(),
                    ));
                }
                info!(reservation_id = %reservation.id, "Replayed reservation for idempotency key");
                Ok(reservation)
            }
        }
    }

    /// Cancels every ticket of a reservation owned by `actor`.
    pub async fn cancel_reservation(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
    ) -> Result<Reservation, AppError> {
        let reservation = self
            .storage
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;
        if reservation.user_id != actor.user_id {
            return Err(AppError::Forbidden(
                "Only the booking user may cancel this reservation".into(),
            ));
        }

        let now = self.clock.now();
        let storage = &self.storage;
        let cancelled = self
            .retry
            .run("cancel_reservation", move || async move {
                storage.cancel_reservation(reservation_id, now).await
            })
            .await?;

        info!(
            reservation_id = %reservation_id,
            tickets = cancelled.tickets.len(),
            "Reservation cancelled"
        );
        Ok(cancelled)
    }

    pub async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, AppError> {
        self.storage.reservations_for_user(user_id).await
    }

    pub async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        self.storage.tickets_for_user(user_id).await
    }

    pub async fn ticket_by_code(&self, code: &str) -> Result<TicketView, AppError> {
        let not_found = || AppError::NotFound("No ticket matches this code".to_string());
        let code = codes::normalize(code).ok_or_else(not_found)?;
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
        let zone_name = event
            .zone(ticket.audience_zone_id)
            .map(|zone| zone.name.clone())
            .unwrap_or_default();

        Ok(TicketView {
            event_name: event.name,
            event_start: event.start_time,
            event_end: event.end_time,
            zone_name,
            ticket,
        })
    }
}

pub fn validate_participants(participants: &[Participant], max: usize) -> Result<(), AppError> {
    if participants.is_empty() {
        return Err(AppError::ValidationError(
            "At least one participant is required".into(),
        ));
    }
    if participants.len() > max {
        return Err(AppError::ValidationError(format!(
            "At most {} participants per reservation",
            max
        )));
    }

    for (index, participant) in participants.iter().enumerate() {
        let position = index + 1;
        for (field, value) in [
            ("first name", &participant.first_name),
            ("last name", &participant.last_name),
        ] {
            let value = value.trim();
            if value.is_empty() {
                return Err(AppError::ValidationError(format!(
                    "Participant {}: {} is required",
                    position, field
                )));
            }
            if value.chars().count() > MAX_NAME_LEN {
                return Err(AppError::ValidationError(format!(
                    "Participant {}: {} must be at most {} characters",
                    position, field, MAX_NAME_LEN
                )));
            }
        }
        if !is_valid_email(participant.email.trim()) {
            return Err(AppError::ValidationError(format!(
                "Participant {}: '{}' is not a valid email address",
                position, participant.email
            )));
        }
    }
    Ok(())
}

/// Syntactic check only: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn normalize_idempotency_key(key: Option<String>) -> Result<Option<String>, AppError> {
    let Some(key) = key else {
        return Ok(None);
    };
    let key = key.trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::ValidationError(format!(
            "Idempotency key must be 1 to {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    Ok(Some(key.to_string()))
}

/// Builds the reservation and its VALID tickets, one per participant in
/// request order.
pub fn prepare_reservation(
    user_id: Uuid,
    request: &ReservationRequest,
    idempotency_key: Option<String>,
    now: DateTime<Utc>,
) -> Reservation {
    let reservation_id = Uuid::new_v4();
    let tickets = request
        .participants
        .iter()
        .map(|participant| Ticket {
            id: Uuid::new_v4(),
            reservation_id,
            event_id: request.event_id,
            audience_zone_id: request.audience_zone_id,
            user_id,
            participant: participant.snapshot(),
            redemption_code: generate_redemption_code(),
            status: TicketStatus::Valid,
            issued_at: now,
            validated_at: None,
        })
        .collect();

    Reservation {
        id: reservation_id,
        user_id,
        reserved_at: now,
        total_amount: Decimal::ZERO,
        idempotency_key,
        tickets,
    }
}

/// The booker gets every ticket; participants who asked for it and have
/// their own address get just theirs.
pub fn delivery_jobs(
    actor: &Actor,
    participants: &[Participant],
    reservation: &Reservation,
) -> Vec<DeliveryJob> {
    let booker = actor.email.trim();
    let mut jobs = Vec::new();

    if booker.is_empty() {
        warn!(reservation_id = %reservation.id, "Booking user has no email, skipping their copy");
    } else {
        jobs.push(DeliveryJob {
            reservation_id: reservation.id,
            recipient: booker.to_string(),
            tickets: reservation.tickets.clone(),
        });
    }

    for (participant, ticket) in participants.iter().zip(&reservation.tickets) {
        let email = participant.email.trim();
        if participant.send_ticket_by_email && !email.eq_ignore_ascii_case(booker) {
            jobs.push(DeliveryJob {
                reservation_id: reservation.id,
                recipient: email.to_string(),
                tickets: vec![ticket.clone()],
            });
        }
    }
    jobs
}
