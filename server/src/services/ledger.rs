//! Capacity Ledger: per-zone accounting of issued tickets.
//!
//! The admission rules live in [`check_bookable`] and [`admit`]; both
//! storage backends call them inside the critical section that also writes
//! the new tickets, so check and write are never separated.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Event, EventAudienceZone, EventStatus, ZoneFill};
use crate::storage::StorageBackend;
use crate::utils::AppError;

/// Verifies that `zone_id` of `event` accepts new bookings at `now`.
pub fn check_bookable(event: &Event, zone_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
    if event.deleted {
        return Err(AppError::NotFound(format!("Event {} not found", event.id)));
    }
    let zone = event.zone(zone_id).ok_or_else(|| {
        AppError::NotFound(format!(
            "Audience zone {} not found for event {}",
            zone_id, event.id
        ))
    })?;
    if event.status != EventStatus::Published {
        return Err(AppError::NotPublished(format!(
            "Event '{}' is {} and cannot be booked",
            event.name, event.status
        )));
    }
    if event.has_started(now) {
        return Err(AppError::NotPublished(format!(
            "Event '{}' has already started",
            event.name
        )));
    }
    if !zone.active {
        return Err(AppError::NotPublished(format!(
            "Audience zone '{}' is closed",
            zone.name
        )));
    }
    Ok(())
}

/// Admits `requested` tickets into a zone with `issued` already counted.
/// Returns the remaining capacity after admission.
pub fn admit(zone_id: Uuid, allocated: u32, issued: u32, requested: u32) -> Result<u32, AppError> {
    let remaining = allocated.saturating_sub(issued);
    if requested > remaining {
        return Err(AppError::InsufficientCapacity {
            zone_id,
            requested,
            remaining,
        });
    }
    Ok(remaining - requested)
}

pub fn fill(zone: &EventAudienceZone, issued: u32) -> ZoneFill {
    ZoneFill {
        zone_id: zone.id,
        event_id: zone.event_id,
        template_id: zone.template_id,
        zone_name: zone.name.clone(),
        allocated_capacity: zone.allocated_capacity,
        issued,
        remaining: zone.allocated_capacity.saturating_sub(issued),
    }
}

pub struct CapacityLedger {
    storage: StorageBackend,
}

impl CapacityLedger {
    pub fn new(storage: StorageBackend) -> Self {
        Self { storage }
    }

    pub async fn zone_fills(&self, event_id: Uuid) -> Result<Vec<ZoneFill>, AppError> {
        let event = self
            .storage
            .get_event(event_id)
            .await?
            .filter(|event| !event.deleted)
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        self.storage.zone_fills(&event).await
    }

    pub async fn remaining(&self, event_id: Uuid, zone_id: Uuid) -> Result<u32, AppError> {
        self.zone_fills(event_id)
            .await?
            .into_iter()
            .find(|fill| fill.zone_id == zone_id)
            .map(|fill| fill.remaining)
            .ok_or_else(|| AppError::NotFound(format!("Audience zone {} not found", zone_id)))
    }
}
