// In-memory storage implementation for dev mode and tests
// Decision: parking_lot locks, one per contended resource
//
// Lock order: structure -> zone slot -> idempotency keys -> ticket.
// Table locks (the RwLock<HashMap>s) are leaves: they are held only long
// enough to clone a handle or a row and never while waiting on another lock.
// Nothing here awaits, so no guard ever lives across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Area, AudienceZoneTemplate, Event, EventStatus, Reservation, ReserveOutcome, TemplateRef,
    Ticket, TicketStatus, ZoneFill,
};
use crate::services::{ledger, scheduler};
use crate::utils::AppError;

/// Capacity counter for one event audience zone.
struct ZoneSlot {
    event_id: Uuid,
    allocated_capacity: u32,
    /// Tickets currently VALID or USED.
    issued: u32,
    ticket_ids: Vec<Uuid>,
}

#[derive(Clone)]
struct ReservationRecord {
    id: Uuid,
    user_id: Uuid,
    zone_id: Uuid,
    reserved_at: DateTime<Utc>,
    total_amount: Decimal,
    idempotency_key: Option<String>,
    ticket_ids: Vec<Uuid>,
}

#[derive(Default)]
pub struct InMemoryStore {
    areas: RwLock<HashMap<Uuid, Area>>,
    templates: RwLock<HashMap<Uuid, AudienceZoneTemplate>>,
    structure_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    events: RwLock<HashMap<Uuid, Event>>,
    zones: RwLock<HashMap<Uuid, Arc<Mutex<ZoneSlot>>>>,
    tickets: RwLock<HashMap<Uuid, Arc<Mutex<Ticket>>>>,
    codes: RwLock<HashMap<String, Uuid>>,
    reservations: RwLock<HashMap<Uuid, ReservationRecord>>,
    idempotency_keys: Mutex<HashMap<(Uuid, String), Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn structure_lock(&self, structure_id: Uuid) -> Arc<Mutex<()>> {
        self.structure_locks
            .lock()
            .entry(structure_id)
            .or_default()
            .clone()
    }

    fn zone_slot(&self, zone_id: Uuid) -> Option<Arc<Mutex<ZoneSlot>>> {
        self.zones.read().get(&zone_id).cloned()
    }

    fn ticket_handle(&self, ticket_id: Uuid) -> Option<Arc<Mutex<Ticket>>> {
        self.tickets.read().get(&ticket_id).cloned()
    }

    fn snapshot_tickets(&self, ticket_ids: &[Uuid]) -> Vec<Ticket> {
        let handles: Vec<_> = {
            let tickets = self.tickets.read();
            ticket_ids
                .iter()
                .filter_map(|id| tickets.get(id).cloned())
                .collect()
        };
        handles.iter().map(|handle| handle.lock().clone()).collect()
    }

    fn load_reservation(&self, reservation_id: Uuid) -> Option<Reservation> {
        let record = self.reservations.read().get(&reservation_id).cloned()?;
        Some(self.assemble(record))
    }

    fn assemble(&self, record: ReservationRecord) -> Reservation {
        Reservation {
            id: record.id,
            user_id: record.user_id,
            reserved_at: record.reserved_at,
            total_amount: record.total_amount,
            idempotency_key: record.idempotency_key,
            tickets: self.snapshot_tickets(&record.ticket_ids),
        }
    }

    fn replay(&self, user_id: Uuid, key: Option<&str>) -> Option<Reservation> {
        let key = key?;
        let reservation_id = self
            .idempotency_keys
            .lock()
            .get(&(user_id, key.to_string()))
            .copied()?;
        self.load_reservation(reservation_id)
    }

    // ============================================
    // Venue topology
    // ============================================

    pub async fn upsert_area(&self, area: Area) -> Result<Area, AppError> {
        self.areas.write().insert(area.id, area.clone());
        Ok(area)
    }

    pub async fn upsert_template(
        &self,
        template: AudienceZoneTemplate,
    ) -> Result<AudienceZoneTemplate, AppError> {
        if !self.areas.read().contains_key(&template.area_id) {
            return Err(AppError::NotFound(format!(
                "Area {} not found",
                template.area_id
            )));
        }
        self.templates.write().insert(template.id, template.clone());
        Ok(template)
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateRef>, AppError> {
        let Some(template) = self.templates.read().get(&template_id).cloned() else {
            return Ok(None);
        };
        let area = self.areas.read().get(&template.area_id).cloned();
        Ok(area.map(|area| TemplateRef { template, area }))
    }

    // ============================================
    // Events
    // ============================================

    pub async fn schedule_event<F>(
        &self,
        structure_id: Uuid,
        event_id: Option<Uuid>,
        plan: F,
    ) -> Result<Event, AppError>
    where
        F: FnOnce(Option<Event>) -> Result<Event, AppError>,
    {
        let lock = self.structure_lock(structure_id);
        let _scheduling = lock.lock();

        let existing = match event_id {
            Some(id) => Some(
                self.events
                    .read()
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?,
            ),
            None => None,
        };
        let previous_zones: Vec<Uuid> = existing
            .iter()
            .flat_map(|event| event.zones.iter().map(|zone| zone.id))
            .collect();

        let event = plan(existing)?;

        let conflicts = {
            let events = self.events.read();
            scheduler::find_conflicts(&event, events.values())
        };
        if !conflicts.is_empty() {
            return Err(AppError::Conflict { conflicts });
        }

        let kept: HashSet<Uuid> = event.zones.iter().map(|zone| zone.id).collect();
        let mut slots = Vec::with_capacity(event.zones.len());
        {
            let mut zones = self.zones.write();
            for dropped in previous_zones.iter().filter(|id| !kept.contains(id)) {
                zones.remove(dropped);
            }
            for zone in &event.zones {
                match zones.get(&zone.id) {
                    Some(slot) => slots.push((slot.clone(), zone.allocated_capacity)),
                    None => {
                        zones.insert(
                            zone.id,
                            Arc::new(Mutex::new(ZoneSlot {
                                event_id: event.id,
                                allocated_capacity: zone.allocated_capacity,
                                issued: 0,
                                ticket_ids: Vec::new(),
                            })),
                        );
                    }
                }
            }
        }
        for (slot, capacity) in slots {
            slot.lock().allocated_capacity = capacity;
        }

        self.events.write().insert(event.id, event.clone());
        Ok(event)
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.events.read().get(&event_id).cloned())
    }

    pub async fn transition_event_status(
        &self,
        event_id: Uuid,
        from: EventStatus,
        to: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        self.update_event_under_lock(event_id, |event| {
            if event.deleted || event.status != from {
                return Err(AppError::TransientConflict(format!(
                    "Event {} changed concurrently",
                    event_id
                )));
            }
            event.status = to;
            event.updated_at = at;
            Ok(())
        })
    }

    pub async fn soft_delete_draft_event(
        &self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.update_event_under_lock(event_id, |event| {
            if event.deleted || event.status != EventStatus::Draft {
                return Err(AppError::TransientConflict(format!(
                    "Event {} changed concurrently",
                    event_id
                )));
            }
            event.deleted = true;
            event.updated_at = at;
            Ok(())
        })
        .map(|_| ())
    }

    fn update_event_under_lock(
        &self,
        event_id: Uuid,
        apply: impl FnOnce(&mut Event) -> Result<(), AppError>,
    ) -> Result<Event, AppError> {
        let structure_id = self
            .events
            .read()
            .get(&event_id)
            .map(|event| event.structure_id)
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        let lock = self.structure_lock(structure_id);
        let _scheduling = lock.lock();

        let mut events = self.events.write();
        let event = events
            .get_mut(&event_id)
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        apply(event)?;
        Ok(event.clone())
    }

    // ============================================
    // Capacity and reservations
    // ============================================

    pub async fn reserve(
        &self,
        pending: Reservation,
        event_id: Uuid,
        zone_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, AppError> {
        if let Some(existing) = self.replay(pending.user_id, pending.idempotency_key.as_deref()) {
            return Ok(ReserveOutcome::Replayed(existing));
        }

        let slot = self.zone_slot(zone_id).ok_or_else(|| {
            AppError::NotFound(format!("Audience zone {} not found", zone_id))
        })?;
        let mut slot = slot.lock();

        // A concurrent request with the same key may have committed while we
        // waited for the slot; replay it before judging capacity. Keyless
        // bookings never touch the key table and contend on their zone only.
        let keys = match &pending.idempotency_key {
            Some(key) => {
                let keys = self.idempotency_keys.lock();
                let scoped = (pending.user_id, key.clone());
                if let Some(&existing_id) = keys.get(&scoped) {
                    drop(keys);
                    drop(slot);
                    return self
                        .load_reservation(existing_id)
                        .map(ReserveOutcome::Replayed)
                        .ok_or_else(|| {
                            AppError::InternalServerError(format!(
                                "Idempotency key points at missing reservation {}",
                                existing_id
                            ))
                        });
                }
                Some((scoped, keys))
            }
            None => None,
        };

        let event = self
            .events
            .read()
            .get(&event_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        ledger::check_bookable(&event, zone_id, now)?;
        let requested = pending.ticket_count();
        ledger::admit(zone_id, slot.allocated_capacity, slot.issued, requested)?;

        {
            let mut codes = self.codes.write();
            if pending
                .tickets
                .iter()
                .any(|ticket| codes.contains_key(&ticket.redemption_code))
            {
                return Err(AppError::InternalServerError(
                    "Redemption code collision".into(),
                ));
            }
            for ticket in &pending.tickets {
                codes.insert(ticket.redemption_code.clone(), ticket.id);
            }
        }
        {
            let mut tickets = self.tickets.write();
            for ticket in &pending.tickets {
                tickets.insert(ticket.id, Arc::new(Mutex::new(ticket.clone())));
            }
        }

        let ticket_ids: Vec<Uuid> = pending.tickets.iter().map(|ticket| ticket.id).collect();
        self.reservations.write().insert(
            pending.id,
            ReservationRecord {
                id: pending.id,
                user_id: pending.user_id,
                zone_id,
                reserved_at: pending.reserved_at,
                total_amount: pending.total_amount,
                idempotency_key: pending.idempotency_key.clone(),
                ticket_ids: ticket_ids.clone(),
            },
        );
        if let Some((scoped, mut keys)) = keys {
            keys.insert(scoped, pending.id);
        }

        slot.issued += requested;
        slot.ticket_ids.extend(ticket_ids);
        Ok(ReserveOutcome::Created(pending))
    }

    pub async fn zone_fills(&self, event: &Event) -> Result<Vec<ZoneFill>, AppError> {
        Ok(event
            .zones
            .iter()
            .map(|zone| {
                let issued = self
                    .zone_slot(zone.id)
                    .map(|slot| slot.lock().issued)
                    .unwrap_or(0);
                ledger::fill(zone, issued)
            })
            .collect())
    }

    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, AppError> {
        Ok(self.load_reservation(reservation_id))
    }

    pub async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, AppError> {
        let mut records: Vec<ReservationRecord> = self
            .reservations
            .read()
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.reserved_at.cmp(&a.reserved_at).then(a.id.cmp(&b.id)));
        Ok(records.into_iter().map(|record| self.assemble(record)).collect())
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Reservation, AppError> {
        let record = self
            .reservations
            .read()
            .get(&reservation_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;
        let slot = self.zone_slot(record.zone_id).ok_or_else(|| {
            AppError::InternalServerError(format!(
                "Zone {} of reservation {} is missing",
                record.zone_id, reservation_id
            ))
        })?;
        let mut slot = slot.lock();

        let handles: Vec<_> = {
            let tickets = self.tickets.read();
            record
                .ticket_ids
                .iter()
                .filter_map(|id| tickets.get(id).cloned())
                .collect()
        };
        let mut guards: Vec<_> = handles.iter().map(|handle| handle.lock()).collect();
        if let Some(blocked) = guards
            .iter()
            .find(|ticket| ticket.status != TicketStatus::Valid)
        {
            return Err(AppError::StateConflict {
                ticket_id: blocked.id,
                status: blocked.status,
                validated_at: blocked.validated_at,
            });
        }
        for ticket in guards.iter_mut() {
            if let Err(status) = ticket.transition_to(TicketStatus::Cancelled, at) {
                return Err(AppError::InternalServerError(format!(
                    "Ticket {} left VALID while locked (now {})",
                    ticket.id, status
                )));
            }
        }
        slot.issued = slot.issued.saturating_sub(guards.len() as u32);
        let tickets = guards.iter().map(|ticket| (**ticket).clone()).collect();
        drop(guards);

        Ok(Reservation {
            id: record.id,
            user_id: record.user_id,
            reserved_at: record.reserved_at,
            total_amount: record.total_amount,
            idempotency_key: record.idempotency_key,
            tickets,
        })
    }

    // ============================================
    // Tickets
    // ============================================

    pub async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, AppError> {
        let Some(ticket_id) = self.codes.read().get(code).copied() else {
            return Ok(None);
        };
        Ok(self
            .ticket_handle(ticket_id)
            .map(|handle| handle.lock().clone()))
    }

    pub async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let mut tickets: Vec<Ticket> = self
            .reservations_for_user(user_id)
            .await?
            .into_iter()
            .rev()
            .flat_map(|reservation| reservation.tickets)
            .collect();
        // Stable: participant order survives within one reservation.
        tickets.sort_by_key(|ticket| ticket.issued_at);
        Ok(tickets)
    }

    pub async fn tickets_for_event(&self, event_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let slots: Vec<_> = self
            .zones
            .read()
            .values()
            .cloned()
            .collect();
        let mut ticket_ids = Vec::new();
        for slot in slots {
            let slot = slot.lock();
            if slot.event_id == event_id {
                ticket_ids.extend(slot.ticket_ids.iter().copied());
            }
        }

        let mut tickets = self.snapshot_tickets(&ticket_ids);
        tickets.sort_by(|a, b| {
            (&a.participant.last_name, &a.participant.first_name, a.id).cmp(&(
                &b.participant.last_name,
                &b.participant.first_name,
                b.id,
            ))
        });
        Ok(tickets)
    }

    pub async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, AppError> {
        let handle = self
            .ticket_handle(ticket_id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))?;
        let mut ticket = handle.lock();
        match ticket.transition_to(TicketStatus::Used, at) {
            Ok(()) => Ok(ticket.clone()),
            Err(status) => Err(AppError::StateConflict {
                ticket_id,
                status,
                validated_at: ticket.validated_at,
            }),
        }
    }

    pub async fn expire_ended_tickets(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let zone_ids: Vec<Uuid> = self
            .events
            .read()
            .values()
            .filter(|event| event.has_ended(now))
            .flat_map(|event| event.zones.iter().map(|zone| zone.id))
            .collect();

        let mut expired = 0u64;
        for zone_id in zone_ids {
            let Some(slot) = self.zone_slot(zone_id) else {
                continue;
            };
            let mut slot = slot.lock();
            let handles: Vec<_> = {
                let tickets = self.tickets.read();
                slot.ticket_ids
                    .iter()
                    .filter_map(|id| tickets.get(id).cloned())
                    .collect()
            };
            for handle in handles {
                if handle.lock().transition_to(TicketStatus::Expired, now).is_ok() {
                    slot.issued = slot.issued.saturating_sub(1);
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }
}
