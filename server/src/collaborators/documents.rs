use std::fmt::Write as _;

use crate::models::Ticket;
use crate::utils::AppError;

pub trait DocumentRenderer: Send + Sync {
    /// Renders one document holding every given ticket.
    fn render_tickets(&self, tickets: &[Ticket]) -> Result<Vec<u8>, AppError>;
}

/// UTF-8 text document, one block per ticket.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

impl DocumentRenderer for PlainTextRenderer {
    fn render_tickets(&self, tickets: &[Ticket]) -> Result<Vec<u8>, AppError> {
        if tickets.is_empty() {
            return Err(AppError::ValidationError(
                "Cannot render an empty ticket document".into(),
            ));
        }

        let mut out = String::new();
        for ticket in tickets {
            writeln!(out, "Ticket {}", ticket.id)
                .and_then(|_| writeln!(out, "Holder: {}", ticket.participant.full_name()))
                .and_then(|_| writeln!(out, "Event: {}", ticket.event_id))
                .and_then(|_| writeln!(out, "Zone: {}", ticket.audience_zone_id))
                .and_then(|_| writeln!(out, "Code: {}", ticket.redemption_code))
                .and_then(|_| writeln!(out))
                .map_err(|e| AppError::InternalServerError(format!("Render failed: {}", e)))?;
        }
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParticipantSnapshot, TicketStatus};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn every_ticket_gets_its_code_rendered() {
        let tickets: Vec<Ticket> = ["alpha", "beta"]
            .iter()
            .map(|code| Ticket {
                id: Uuid::new_v4(),
                reservation_id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                audience_zone_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                participant: ParticipantSnapshot {
                    first_name: "Grace".into(),
                    last_name: "Hopper".into(),
                    email: "grace@example.com".into(),
                },
                redemption_code: code.to_string(),
                status: TicketStatus::Valid,
                issued_at: Utc::now(),
                validated_at: None,
            })
            .collect();

        let bytes = PlainTextRenderer.render_tickets(&tickets).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Code: alpha"));
        assert!(text.contains("Code: beta"));
        assert!(text.contains("Holder: Grace Hopper"));
    }

    #[test]
    fn empty_documents_are_refused() {
        assert!(PlainTextRenderer.render_tickets(&[]).is_err());
    }
}
