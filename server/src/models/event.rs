use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "DRAFT",
            EventStatus::Published => "PUBLISHED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }

    /// Drafts may be published or cancelled; a published event may only be cancelled.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Draft, EventStatus::Published)
                | (EventStatus::Draft, EventStatus::Cancelled)
                | (EventStatus::Published, EventStatus::Cancelled)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(EventStatus::Draft),
            "PUBLISHED" => Ok(EventStatus::Published),
            "CANCELLED" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown event status '{}'", other)),
        }
    }
}

/// Capacity allocated to one audience zone for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAudienceZone {
    pub id: Uuid,
    pub event_id: Uuid,
    pub template_id: Uuid,
    /// Copied from the template so conflict checks never need a join.
    pub area_id: Uuid,
    pub name: String,
    pub allocated_capacity: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub structure_id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: EventStatus,
    pub deleted: bool,
    pub category_ids: BTreeSet<Uuid>,
    pub zones: Vec<EventAudienceZone>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn area_ids(&self) -> BTreeSet<Uuid> {
        self.zones.iter().map(|zone| zone.area_id).collect()
    }

    pub fn zone(&self, zone_id: Uuid) -> Option<&EventAudienceZone> {
        self.zones.iter().find(|zone| zone.id == zone_id)
    }

    /// Whether this event still holds its areas for the venue calendar.
    pub fn occupies_venue(&self) -> bool {
        !self.deleted && self.status != EventStatus::Cancelled
    }

    /// Half-open interval intersection with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// One requested zone of an event proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneAllocation {
    pub area_id: Uuid,
    pub template_id: Uuid,
    pub allocated_capacity: u32,
}

/// Proposed state of an event, used for both creation and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub structure_id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub category_ids: BTreeSet<Uuid>,
    pub zones: Vec<ZoneAllocation>,
}

/// An already scheduled event that collides with a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingEvent {
    pub event_id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub area_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap()
    }

    fn event(start: u32, end: u32) -> Event {
        Event {
            id: Uuid::new_v4(),
            structure_id: Uuid::new_v4(),
            name: "Concert".to_string(),
            start_time: at(start),
            end_time: at(end),
            status: EventStatus::Published,
            deleted: false,
            category_ids: BTreeSet::new(),
            zones: Vec::new(),
            created_by: Uuid::new_v4(),
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let scheduled = event(10, 12);
        assert!(scheduled.overlaps(at(11), at(13)));
        assert!(scheduled.overlaps(at(9), at(11)));
        assert!(scheduled.overlaps(at(10), at(12)));
        assert!(!scheduled.overlaps(at(12), at(13)));
        assert!(!scheduled.overlaps(at(8), at(10)));
    }

    #[test]
    fn cancelled_and_deleted_events_release_the_venue() {
        let mut scheduled = event(10, 12);
        assert!(scheduled.occupies_venue());

        scheduled.status = EventStatus::Cancelled;
        assert!(!scheduled.occupies_venue());

        scheduled.status = EventStatus::Draft;
        scheduled.deleted = true;
        assert!(!scheduled.occupies_venue());
    }

    #[test]
    fn published_events_can_only_be_cancelled() {
        assert!(EventStatus::Draft.can_transition_to(EventStatus::Published));
        assert!(EventStatus::Draft.can_transition_to(EventStatus::Cancelled));
        assert!(EventStatus::Published.can_transition_to(EventStatus::Cancelled));
        assert!(!EventStatus::Published.can_transition_to(EventStatus::Draft));
        assert!(!EventStatus::Cancelled.can_transition_to(EventStatus::Published));
        assert!(!EventStatus::Cancelled.can_transition_to(EventStatus::Draft));
    }
}
