use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ticket::{ParticipantSnapshot, Ticket};

/// A person a ticket is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Also deliver this participant's ticket to their own address.
    #[serde(default)]
    pub send_ticket_by_email: bool,
}

impl Participant {
    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub event_id: Uuid,
    pub audience_zone_id: Uuid,
    pub participants: Vec<Participant>,
}

/// One booking transaction and the tickets it issued, in participant order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reserved_at: DateTime<Utc>,
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub tickets: Vec<Ticket>,
}

impl Reservation {
    pub fn ticket_count(&self) -> u32 {
        self.tickets.len() as u32
    }
}

/// Result of the atomic reserve step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Created(Reservation),
    /// An earlier reservation with the same idempotency key was found.
    Replayed(Reservation),
}

impl ReserveOutcome {
    pub fn into_reservation(self) -> Reservation {
        match self {
            ReserveOutcome::Created(reservation) | ReserveOutcome::Replayed(reservation) => {
                reservation
            }
        }
    }
}
