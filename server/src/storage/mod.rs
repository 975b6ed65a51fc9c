// Persistence for the engine.
// PostgreSQL in production, an in-memory store for dev mode and tests.
// Both honour the same atomicity guarantees.

pub mod backend;
pub mod memory;
pub mod postgres;

pub use backend::StorageBackend;
pub use memory::InMemoryStore;
pub use postgres::PgStore;
