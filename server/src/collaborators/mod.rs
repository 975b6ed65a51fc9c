//! Services the engine calls but does not own: staff authorization, ticket
//! document rendering and delivery to recipients.

pub mod authorization;
pub mod delivery;
pub mod documents;
pub mod notifier;

pub use authorization::{AuthorizationGate, StructureMembershipGate};
pub use delivery::{DeliveryJob, TicketDelivery};
pub use documents::{DocumentRenderer, PlainTextRenderer};
pub use notifier::{LogNotifier, Notifier};
