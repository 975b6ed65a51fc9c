use async_trait::async_trait;
use tracing::info;

use crate::utils::AppError;

/// Delivers a rendered ticket document to one recipient address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver_tickets(&self, recipient: &str, document: &[u8]) -> Result<(), AppError>;
}

/// Records deliveries in the log instead of sending them. Dev mode default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver_tickets(&self, recipient: &str, document: &[u8]) -> Result<(), AppError> {
        info!(recipient, bytes = document.len(), "Ticket document delivered");
        Ok(())
    }
}
