pub mod engine;
pub mod ledger;
pub mod reservations;
pub mod scheduler;
pub mod validation;

pub use engine::{EngineSettings, TicketingEngine};
pub use ledger::CapacityLedger;
pub use reservations::ReservationService;
pub use scheduler::EventScheduler;
pub use validation::TicketValidator;
