//! Event Scheduler: venue double-booking prevention and zone allocation.
//!
//! A proposal is validated against the venue topology first, then planned
//! and conflict-checked inside one storage transaction serialized per
//! structure. Either the event and all of its zones are written, or nothing
//! is.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::AuthorizationGate;
use crate::models::{
    Actor, ConflictingEvent, Event, EventAudienceZone, EventDraft, EventStatus, TemplateRef,
};
use crate::storage::StorageBackend;
use crate::utils::{AppError, Clock, RetryPolicy};

const MAX_EVENT_NAME_LEN: usize = 255;

pub struct EventScheduler {
    storage: StorageBackend,
    gate: Arc<dyn AuthorizationGate>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl EventScheduler {
    pub fn new(
        storage: StorageBackend,
        gate: Arc<dyn AuthorizationGate>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            gate,
            clock,
            retry,
        }
    }

    /// Creates a new event (`event_id == None`) or updates an existing one.
    pub async fn create_or_update_event(
        &self,
        actor: &Actor,
        event_id: Option<Uuid>,
        draft: EventDraft,
    ) -> Result<Event, AppError> {
        self.authorize(actor, draft.structure_id).await?;
        if let Some(event_id) = event_id {
            let current = live_event(&self.storage, event_id).await?;
            self.authorize(actor, current.structure_id).await?;
        }
        validate_draft(&draft)?;
        let templates = self.resolve_templates(&draft).await?;
        let now = self.clock.now();
        let created_by = actor.user_id;

        let storage = &self.storage;
        let draft = &draft;
        let templates = &templates;
        let event = self
            .retry
            .run("schedule_event", move || async move {
                storage
                    .schedule_event(draft.structure_id, event_id, move |existing| {
                        plan_event(existing, draft, templates, created_by, now)
                    })
                    .await
            })
            .await?;

        info!(
            event_id = %event.id,
            structure_id = %event.structure_id,
            zones = event.zones.len(),
            updated = event_id.is_some(),
            "Event scheduled"
        );
        Ok(event)
    }

    pub async fn update_status(
        &self,
        actor: &Actor,
        event_id: Uuid,
        next: EventStatus,
    ) -> Result<Event, AppError> {
        let current = live_event(&self.storage, event_id).await?;
        self.authorize(actor, current.structure_id).await?;
        let now = self.clock.now();
        let storage = &self.storage;
        let event = self
            .retry
            .run("update_event_status", move || async move {
                let current = live_event(storage, event_id).await?;
                if current.status == next {
                    return Ok(current);
                }
                if !current.status.can_transition_to(next) {
                    return Err(AppError::ValidationError(format!(
                        "Invalid status transition from {} to {}",
                        current.status, next
                    )));
                }
                storage
                    .transition_event_status(event_id, current.status, next, now)
                    .await
            })
            .await?;

        info!(
            event_id = %event_id,
            status = %event.status,
            changed_by = %actor.user_id,
            "Event status updated"
        );
        Ok(event)
    }

    /// Soft-deletes a draft event.
    pub async fn delete_event(&self, actor: &Actor, event_id: Uuid) -> Result<(), AppError> {
        let current = live_event(&self.storage, event_id).await?;
        self.authorize(actor, current.structure_id).await?;
        let now = self.clock.now();
        let storage = &self.storage;
        self.retry
            .run("delete_event", move || async move {
                let current = live_event(storage, event_id).await?;
                if current.status != EventStatus::Draft {
                    return Err(AppError::ValidationError(format!(
                        "Only DRAFT events can be deleted (current status: {}); cancel it instead",
                        current.status
                    )));
                }
                storage.soft_delete_draft_event(event_id, now).await
            })
            .await?;

        info!(event_id = %event_id, deleted_by = %actor.user_id, "Draft event deleted");
        Ok(())
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Event, AppError> {
        live_event(&self.storage, event_id).await
    }

    async fn authorize(&self, actor: &Actor, structure_id: Uuid) -> Result<(), AppError> {
        if self.gate.can_manage_events(structure_id, actor).await {
            return Ok(());
        }
        warn!(
            actor_id = %actor.user_id,
            role = %actor.role,
            structure_id = %structure_id,
            "Event change refused"
        );
        Err(AppError::Forbidden(
            "You are not allowed to manage events of this structure".into(),
        ))
    }

    async fn resolve_templates(
        &self,
        draft: &EventDraft,
    ) -> Result<HashMap<Uuid, TemplateRef>, AppError> {
        let mut resolved = HashMap::with_capacity(draft.zones.len());
        for allocation in &draft.zones {
            let template_ref = self
                .storage
                .get_template(allocation.template_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "Audience zone template {} not found",
                        allocation.template_id
                    ))
                })?;
            let template = &template_ref.template;

            if template_ref.structure_id() != draft.structure_id {
                return Err(AppError::ValidationError(format!(
                    "Template {} does not belong to structure {}",
                    template.id, draft.structure_id
                )));
            }
            if template.area_id != allocation.area_id {
                return Err(AppError::ValidationError(format!(
                    "Template {} belongs to area {}, not {}",
                    template.id, template.area_id, allocation.area_id
                )));
            }
            if !template.active {
                return Err(AppError::ValidationError(format!(
                    "Template '{}' is inactive",
                    template.name
                )));
            }
            if allocation.allocated_capacity > template.max_capacity {
                return Err(AppError::ValidationError(format!(
                    "Allocated capacity {} for zone '{}' exceeds the template maximum of {}",
                    allocation.allocated_capacity, template.name, template.max_capacity
                )));
            }
            resolved.insert(template.id, template_ref);
        }
        debug!(templates = resolved.len(), "Resolved zone templates");
        Ok(resolved)
    }
}

async fn live_event(storage: &StorageBackend, event_id: Uuid) -> Result<Event, AppError> {
    storage
        .get_event(event_id)
        .await?
        .filter(|event| !event.deleted)
        .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))
}

/// Input checks that need no storage access.
pub fn validate_draft(draft: &EventDraft) -> Result<(), AppError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError("Event name is required".into()));
    }
    if name.chars().count() > MAX_EVENT_NAME_LEN {
        return Err(AppError::ValidationError(format!(
            "Event name must be at most {} characters",
            MAX_EVENT_NAME_LEN
        )));
    }
    if draft.end_time <= draft.start_time {
        return Err(AppError::ValidationError(
            "Event end time must be after its start time".into(),
        ));
    }
    if draft.zones.is_empty() {
        return Err(AppError::ValidationError(
            "An event needs at least one audience zone".into(),
        ));
    }

    let mut seen = HashSet::with_capacity(draft.zones.len());
    for allocation in &draft.zones {
        if allocation.allocated_capacity == 0 {
            return Err(AppError::ValidationError(format!(
                "Allocated capacity for template {} must be positive",
                allocation.template_id
            )));
        }
        if !seen.insert(allocation.template_id) {
            return Err(AppError::ValidationError(format!(
                "Template {} is configured more than once",
                allocation.template_id
            )));
        }
    }
    Ok(())
}

/// Builds the event to persist from the stored state (if any) and the draft.
///
/// Runs inside the scheduling transaction, after `existing` was locked.
pub fn plan_event(
    existing: Option<Event>,
    draft: &EventDraft,
    templates: &HashMap<Uuid, TemplateRef>,
    created_by: Uuid,
    now: DateTime<Utc>,
) -> Result<Event, AppError> {
    let Some(mut event) = existing else {
        let event_id = Uuid::new_v4();
        return Ok(Event {
            id: event_id,
            structure_id: draft.structure_id,
            name: draft.name.trim().to_string(),
            start_time: draft.start_time,
            end_time: draft.end_time,
            status: EventStatus::Draft,
            deleted: false,
            category_ids: draft.category_ids.clone(),
            zones: build_zones(event_id, draft, templates, &HashMap::new())?,
            created_by,
            created_at: now,
            updated_at: now,
        });
    };

    if event.deleted {
        return Err(AppError::NotFound(format!("Event {} not found", event.id)));
    }
    if event.status == EventStatus::Cancelled {
        return Err(AppError::ValidationError(
            "Cancelled events cannot be modified".into(),
        ));
    }
    if event.structure_id != draft.structure_id {
        return Err(AppError::ValidationError(
            "An event cannot be moved to another structure".into(),
        ));
    }

    if event.status == EventStatus::Published {
        let restricted = restricted_changes(&event, draft);
        if !restricted.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Event is published; these fields can no longer change: {}",
                restricted.join(", ")
            )));
        }
    } else {
        let existing_by_template: HashMap<Uuid, Uuid> = event
            .zones
            .iter()
            .map(|zone| (zone.template_id, zone.id))
            .collect();
        event.name = draft.name.trim().to_string();
        event.start_time = draft.start_time;
        event.end_time = draft.end_time;
        event.zones = build_zones(event.id, draft, templates, &existing_by_template)?;
    }

    event.category_ids = draft.category_ids.clone();
    event.updated_at = now;
    Ok(event)
}

fn build_zones(
    event_id: Uuid,
    draft: &EventDraft,
    templates: &HashMap<Uuid, TemplateRef>,
    existing_by_template: &HashMap<Uuid, Uuid>,
) -> Result<Vec<EventAudienceZone>, AppError> {
    draft
        .zones
        .iter()
        .map(|allocation| {
            let template_ref = templates.get(&allocation.template_id).ok_or_else(|| {
                AppError::NotFound(format!(
                    "Audience zone template {} not found",
                    allocation.template_id
                ))
            })?;
            Ok(EventAudienceZone {
                id: existing_by_template
                    .get(&allocation.template_id)
                    .copied()
                    .unwrap_or_else(Uuid::new_v4),
                event_id,
                template_id: allocation.template_id,
                area_id: template_ref.template.area_id,
                name: template_ref.template.name.clone(),
                allocated_capacity: allocation.allocated_capacity,
                active: true,
            })
        })
        .collect()
}

fn restricted_changes(event: &Event, draft: &EventDraft) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if event.name != draft.name.trim() {
        changed.push("name");
    }
    if event.start_time != draft.start_time {
        changed.push("start time");
    }
    if event.end_time != draft.end_time {
        changed.push("end time");
    }

    let current: BTreeSet<(Uuid, u32)> = event
        .zones
        .iter()
        .map(|zone| (zone.template_id, zone.allocated_capacity))
        .collect();
    let requested: BTreeSet<(Uuid, u32)> = draft
        .zones
        .iter()
        .map(|allocation| (allocation.template_id, allocation.allocated_capacity))
        .collect();
    if current != requested {
        changed.push("audience zones");
    }
    changed
}

/// Scheduled events that would share an area with `candidate` during an
/// overlapping `[start, end)` window. `candidate` itself is skipped.
pub fn find_conflicts<'a>(
    candidate: &Event,
    scheduled: impl IntoIterator<Item = &'a Event>,
) -> Vec<ConflictingEvent> {
    if !candidate.occupies_venue() {
        return Vec::new();
    }
    let areas = candidate.area_ids();

    let mut conflicts: Vec<ConflictingEvent> = scheduled
        .into_iter()
        .filter(|other| {
            other.id != candidate.id
                && other.structure_id == candidate.structure_id
                && other.occupies_venue()
                && other.overlaps(candidate.start_time, candidate.end_time)
        })
        .filter_map(|other| {
            let shared: Vec<Uuid> = other.area_ids().intersection(&areas).copied().collect();
            if shared.is_empty() {
                None
            } else {
                Some(ConflictingEvent {
                    event_id: other.id,
                    name: other.name.clone(),
                    start_time: other.start_time,
                    end_time: other.end_time,
                    area_ids: shared,
                })
            }
        })
        .collect();
    conflicts.sort_by_key(|conflict| (conflict.start_time, conflict.event_id));
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Area, AudienceZoneTemplate, SeatingType, ZoneAllocation};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap()
    }

    struct Venue {
        structure_id: Uuid,
        area_id: Uuid,
        templates: HashMap<Uuid, TemplateRef>,
        template_id: Uuid,
    }

    fn venue() -> Venue {
        let structure_id = Uuid::new_v4();
        let area = Area {
            id: Uuid::new_v4(),
            structure_id,
            name: "Main hall".into(),
        };
        let template = AudienceZoneTemplate {
            id: Uuid::new_v4(),
            area_id: area.id,
            name: "Pit".into(),
            max_capacity: 100,
            seating_type: SeatingType::Standing,
            active: true,
        };
        let template_id = template.id;
        let area_id = area.id;
        let mut templates = HashMap::new();
        templates.insert(template.id, TemplateRef { template, area });
        Venue {
            structure_id,
            area_id,
            templates,
            template_id,
        }
    }

    fn draft(venue: &Venue, start: u32, end: u32, capacity: u32) -> EventDraft {
        EventDraft {
            structure_id: venue.structure_id,
            name: "Night show".into(),
            start_time: at(start),
            end_time: at(end),
            category_ids: BTreeSet::new(),
            zones: vec![ZoneAllocation {
                area_id: venue.area_id,
                template_id: venue.template_id,
                allocated_capacity: capacity,
            }],
        }
    }

    #[test]
    fn rejects_inverted_or_empty_windows() {
        let venue = venue();
        assert!(matches!(
            validate_draft(&draft(&venue, 12, 10, 10)),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            validate_draft(&draft(&venue, 10, 10, 10)),
            Err(AppError::ValidationError(_))
        ));
        assert!(validate_draft(&draft(&venue, 10, 12, 10)).is_ok());
    }

    #[test]
    fn rejects_zero_capacity_and_duplicate_templates() {
        let venue = venue();
        assert!(validate_draft(&draft(&venue, 10, 12, 0)).is_err());

        let mut duplicated = draft(&venue, 10, 12, 10);
        duplicated.zones.push(duplicated.zones[0].clone());
        assert!(validate_draft(&duplicated).is_err());

        let mut no_zones = draft(&venue, 10, 12, 10);
        no_zones.zones.clear();
        assert!(validate_draft(&no_zones).is_err());
    }

    #[test]
    fn new_events_start_as_drafts_with_denormalized_areas() {
        let venue = venue();
        let event = plan_event(
            None,
            &draft(&venue, 10, 12, 40),
            &venue.templates,
            Uuid::new_v4(),
            at(1),
        )
        .unwrap();

        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.zones.len(), 1);
        assert_eq!(event.zones[0].area_id, venue.area_id);
        assert_eq!(event.zones[0].event_id, event.id);
        assert_eq!(event.zones[0].name, "Pit");
    }

    #[test]
    fn draft_updates_keep_zone_ids_per_template() {
        let venue = venue();
        let original = plan_event(
            None,
            &draft(&venue, 10, 12, 40),
            &venue.templates,
            Uuid::new_v4(),
            at(1),
        )
        .unwrap();
        let zone_id = original.zones[0].id;

        let updated = plan_event(
            Some(original),
            &draft(&venue, 14, 16, 60),
            &venue.templates,
            Uuid::new_v4(),
            at(2),
        )
        .unwrap();

        assert_eq!(updated.zones[0].id, zone_id);
        assert_eq!(updated.zones[0].allocated_capacity, 60);
        assert_eq!(updated.start_time, at(14));
        assert_eq!(updated.updated_at, at(2));
    }

    #[test]
    fn published_events_only_accept_category_changes() {
        let venue = venue();
        let mut published = plan_event(
            None,
            &draft(&venue, 10, 12, 40),
            &venue.templates,
            Uuid::new_v4(),
            at(1),
        )
        .unwrap();
        published.status = EventStatus::Published;

        let moved = plan_event(
            Some(published.clone()),
            &draft(&venue, 11, 12, 40),
            &venue.templates,
            Uuid::new_v4(),
            at(2),
        );
        match moved {
            Err(AppError::ValidationError(msg)) => assert!(msg.contains("start time")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let mut recategorized = draft(&venue, 10, 12, 40);
        recategorized.category_ids.insert(Uuid::new_v4());
        let updated = plan_event(
            Some(published),
            &recategorized,
            &venue.templates,
            Uuid::new_v4(),
            at(2),
        )
        .unwrap();
        assert_eq!(updated.category_ids, recategorized.category_ids);
    }

    #[test]
    fn cancelled_events_cannot_be_modified() {
        let venue = venue();
        let mut cancelled = plan_event(
            None,
            &draft(&venue, 10, 12, 40),
            &venue.templates,
            Uuid::new_v4(),
            at(1),
        )
        .unwrap();
        cancelled.status = EventStatus::Cancelled;

        let result = plan_event(
            Some(cancelled),
            &draft(&venue, 10, 12, 40),
            &venue.templates,
            Uuid::new_v4(),
            at(2),
        );
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn conflicts_require_shared_area_and_overlap() {
        let venue = venue();
        let plan = |start, end| {
            plan_event(
                None,
                &draft(&venue, start, end, 10),
                &venue.templates,
                Uuid::new_v4(),
                at(1),
            )
            .unwrap()
        };
        let a = plan(10, 12);
        let b = plan(11, 13);
        let c = plan(12, 13);

        let conflicts = find_conflicts(&b, [&a]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].event_id, a.id);
        assert_eq!(conflicts[0].area_ids, vec![venue.area_id]);

        assert!(find_conflicts(&c, [&a]).is_empty());

        let mut cancelled = a.clone();
        cancelled.status = EventStatus::Cancelled;
        assert!(find_conflicts(&b, [&cancelled]).is_empty());

        let mut elsewhere = plan(10, 12);
        elsewhere.zones[0].area_id = Uuid::new_v4();
        assert!(find_conflicts(&b, [&elsewhere]).is_empty());
    }
}
