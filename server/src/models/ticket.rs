use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Valid,
    Used,
    Cancelled,
    Expired,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Valid,
        TicketStatus::Used,
        TicketStatus::Cancelled,
        TicketStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Valid => "VALID",
            TicketStatus::Used => "USED",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Expired => "EXPIRED",
        }
    }

    /// Statuses that hold a slot in the zone's capacity.
    pub fn holds_capacity(&self) -> bool {
        matches!(self, TicketStatus::Valid | TicketStatus::Used)
    }

    /// Wire names of the capacity-holding statuses, for storage queries.
    pub fn capacity_holding() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|status| status.holds_capacity())
            .map(TicketStatus::as_str)
            .collect()
    }

    /// Only `VALID` has outgoing edges.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        self == TicketStatus::Valid && next != TicketStatus::Valid
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(TicketStatus::Valid),
            "USED" => Ok(TicketStatus::Used),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "EXPIRED" => Ok(TicketStatus::Expired),
            other => Err(format!("unknown ticket status '{}'", other)),
        }
    }
}

/// Holder details captured when the ticket is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ParticipantSnapshot {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub event_id: Uuid,
    pub audience_zone_id: Uuid,
    /// The booking user, which may differ from the participant.
    pub user_id: Uuid,
    pub participant: ParticipantSnapshot,
    pub redemption_code: String,
    pub status: TicketStatus,
    pub issued_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Applies a status transition, returning the current status when the
    /// move is not allowed.
    pub fn transition_to(
        &mut self,
        next: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<(), TicketStatus> {
        if !self.status.can_transition_to(next) {
            return Err(self.status);
        }
        self.status = next;
        if next == TicketStatus::Used {
            self.validated_at = Some(at);
        }
        Ok(())
    }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.participant.first_name.to_lowercase().contains(&needle)
            || self.participant.last_name.to_lowercase().contains(&needle)
            || self.participant.email.to_lowercase().contains(&needle)
            || self.id.to_string().contains(&needle)
    }
}

/// Ticket as shown to its holder, enriched with event and zone names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub event_name: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub zone_name: String,
}

/// Outcome of a successful door scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub status: TicketStatus,
    pub participant: ParticipantSnapshot,
    pub validated_at: DateTime<Utc>,
}

/// Issued tickets against allocated capacity for one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFill {
    pub zone_id: Uuid,
    pub event_id: Uuid,
    pub template_id: Uuid,
    pub zone_name: String,
    pub allocated_capacity: u32,
    pub issued: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub search: Option<String>,
    #[serde(default)]
    pub page: u32,
    pub size: Option<u32>,
}

impl TicketFilter {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn page_size(&self) -> u32 {
        self.size
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .clamp(1, Self::MAX_PAGE_SIZE)
    }

    pub fn accepts(&self, ticket: &Ticket) -> bool {
        if let Some(status) = self.status {
            if ticket.status != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => ticket.matches_search(needle),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slices an already filtered, ordered list.
    pub fn from_filtered(all: Vec<T>, page: u32, size: u32) -> Self {
        let total = all.len() as u64;
        let total_pages = ((total + size as u64 - 1) / size as u64) as u32;
        let items = all
            .into_iter()
            .skip(page as usize * size as usize)
            .take(size as usize)
            .collect();
        Self {
            items,
            total,
            page,
            size,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            reservation_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            audience_zone_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            participant: ParticipantSnapshot {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
            },
            redemption_code: "code".to_string(),
            status,
            issued_at: Utc::now(),
            validated_at: None,
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for terminal in [TicketStatus::Used, TicketStatus::Cancelled, TicketStatus::Expired] {
            for next in TicketStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn using_a_ticket_stamps_the_validation_time() {
        let mut t = ticket(TicketStatus::Valid);
        let now = Utc::now();
        assert!(t.transition_to(TicketStatus::Used, now).is_ok());
        assert_eq!(t.validated_at, Some(now));
        assert_eq!(t.transition_to(TicketStatus::Used, now), Err(TicketStatus::Used));
    }

    #[test]
    fn only_valid_and_used_hold_capacity() {
        assert!(TicketStatus::Valid.holds_capacity());
        assert!(TicketStatus::Used.holds_capacity());
        assert!(!TicketStatus::Cancelled.holds_capacity());
        assert!(!TicketStatus::Expired.holds_capacity());
        assert_eq!(TicketStatus::capacity_holding(), vec!["VALID", "USED"]);
    }

    #[test]
    fn filter_matches_status_and_case_insensitive_search() {
        let t = ticket(TicketStatus::Used);
        let filter = TicketFilter {
            status: Some(TicketStatus::Used),
            search: Some("LOVE".to_string()),
            ..Default::default()
        };
        assert!(filter.accepts(&t));

        let wrong_status = TicketFilter {
            status: Some(TicketStatus::Valid),
            ..Default::default()
        };
        assert!(!wrong_status.accepts(&t));
    }

    #[test]
    fn page_slices_and_counts() {
        let page = Page::from_filtered((0..45).collect::<Vec<_>>(), 2, 20);
        assert_eq!(page.items, (40..45).collect::<Vec<_>>());
        assert_eq!(page.total, 45);
        assert_eq!(page.total_pages, 3);
    }
}
