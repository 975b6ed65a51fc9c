pub mod event;
pub mod reservation;
pub mod ticket;
pub mod user;
pub mod venue;

pub use event::{ConflictingEvent, Event, EventAudienceZone, EventDraft, EventStatus, ZoneAllocation};
pub use reservation::{Participant, Reservation, ReservationRequest, ReserveOutcome};
pub use ticket::{
    Page, ParticipantSnapshot, Ticket, TicketFilter, TicketStatus, TicketView, ValidationResult,
    ZoneFill,
};
pub use user::{Actor, Role};
pub use venue::{Area, AudienceZoneTemplate, SeatingType, TemplateRef};
