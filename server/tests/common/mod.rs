//! Shared fixtures: one structure with two areas, a fixed clock, and helpers
//! to schedule and book events on the in-memory engine.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tickly_server::models::{
    Actor, Area, AudienceZoneTemplate, Event, EventDraft, EventStatus, Participant, Reservation,
    ReservationRequest, Role, SeatingType, ZoneAllocation,
};
use tickly_server::services::TicketingEngine;
use tickly_server::utils::{AppError, FixedClock};
use uuid::Uuid;

/// 2026-06-01 09:00 UTC, a week before the default event.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// Same day as `base_time()` at the given hour.
pub fn at(day_offset: i64, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0).unwrap() + Duration::days(day_offset)
}

pub struct Venue {
    pub engine: TicketingEngine,
    pub clock: Arc<FixedClock>,
    pub structure_id: Uuid,
    pub admin: Actor,
    pub stage: Area,
    pub hall: Area,
    pub stage_pit: AudienceZoneTemplate,
    pub stage_balcony: AudienceZoneTemplate,
    pub hall_floor: AudienceZoneTemplate,
}

impl Venue {
    pub async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(base_time()));
        let engine = TicketingEngine::in_memory(clock.clone());
        let structure_id = Uuid::new_v4();

        let stage = engine
            .register_area(Area {
                id: Uuid::new_v4(),
                structure_id,
                name: "Main stage".into(),
            })
            .await
            .unwrap();
        let hall = engine
            .register_area(Area {
                id: Uuid::new_v4(),
                structure_id,
                name: "Small hall".into(),
            })
            .await
            .unwrap();

        let stage_pit = template(&engine, &stage, "Pit", 500, SeatingType::Standing).await;
        let stage_balcony = template(&engine, &stage, "Balcony", 120, SeatingType::Seated).await;
        let hall_floor = template(&engine, &hall, "Floor", 80, SeatingType::Mixed).await;

        Self {
            admin: Actor::staff(
                Uuid::new_v4(),
                "admin@venue.test",
                Role::StructureAdministrator,
                structure_id,
            ),
            engine,
            clock,
            structure_id,
            stage,
            hall,
            stage_pit,
            stage_balcony,
            hall_floor,
        }
    }

    pub fn draft(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        zones: &[(&AudienceZoneTemplate, u32)],
    ) -> EventDraft {
        EventDraft {
            structure_id: self.structure_id,
            name: name.into(),
            start_time: start,
            end_time: end,
            category_ids: BTreeSet::new(),
            zones: zones
                .iter()
                .map(|(template, capacity)| ZoneAllocation {
                    area_id: template.area_id,
                    template_id: template.id,
                    allocated_capacity: *capacity,
                })
                .collect(),
        }
    }

    pub async fn schedule(&self, draft: EventDraft) -> Result<Event, AppError> {
        self.engine
            .create_or_update_event(&self.admin, None, draft)
            .await
    }

    /// Published concert on the stage pit, a week out, 20:00 to 23:00.
    pub async fn published_concert(&self, capacity: u32) -> Event {
        let draft = self.draft(
            "Concert",
            at(7, 20),
            at(7, 23),
            &[(&self.stage_pit, capacity)],
        );
        let event = self.schedule(draft).await.unwrap();
        self.engine
            .update_event_status(&self.admin, event.id, EventStatus::Published)
            .await
            .unwrap()
    }

    /// Published quiz in the small hall, nine days out.
    pub async fn published_other_day(&self) -> Event {
        let draft = self.draft("Quiz night", at(9, 20), at(9, 23), &[(&self.hall_floor, 50)]);
        let event = self.schedule(draft).await.unwrap();
        self.engine
            .update_event_status(&self.admin, event.id, EventStatus::Published)
            .await
            .unwrap()
    }

    pub fn door_staff(&self) -> Actor {
        Actor::staff(
            Uuid::new_v4(),
            "door@venue.test",
            Role::ReservationService,
            self.structure_id,
        )
    }

    pub async fn book(
        &self,
        actor: &Actor,
        event: &Event,
        seats: usize,
    ) -> Result<Reservation, AppError> {
        book(&self.engine, actor, event.id, event.zones[0].id, seats, None).await
    }
}

async fn template(
    engine: &TicketingEngine,
    area: &Area,
    name: &str,
    max_capacity: u32,
    seating_type: SeatingType,
) -> AudienceZoneTemplate {
    engine
        .register_template(AudienceZoneTemplate {
            id: Uuid::new_v4(),
            area_id: area.id,
            name: name.into(),
            max_capacity,
            seating_type,
            active: true,
        })
        .await
        .unwrap()
}

pub fn spectator() -> Actor {
    let id = Uuid::new_v4();
    Actor::spectator(id, format!("{}@fans.test", id.simple()))
}

pub fn participants(count: usize) -> Vec<Participant> {
    (0..count)
        .map(|i| Participant {
            first_name: format!("Guest{}", i + 1),
            last_name: "Doe".into(),
            email: format!("guest{}@fans.test", i + 1),
            send_ticket_by_email: false,
        })
        .collect()
}

pub async fn book(
    engine: &TicketingEngine,
    actor: &Actor,
    event_id: Uuid,
    zone_id: Uuid,
    seats: usize,
    idempotency_key: Option<&str>,
) -> Result<Reservation, AppError> {
    engine
        .create_reservation(
            actor,
            ReservationRequest {
                event_id,
                audience_zone_id: zone_id,
                participants: participants(seats),
            },
            idempotency_key.map(str::to_string),
        )
        .await
}
