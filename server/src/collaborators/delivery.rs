//! Asynchronous ticket delivery.
//!
//! Booking only enqueues; a background worker renders and sends. Delivery
//! failures are retried and logged but never affect a committed reservation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::documents::DocumentRenderer;
use super::notifier::Notifier;
use crate::models::Ticket;
use crate::utils::{AppError, RetryPolicy};

#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub reservation_id: Uuid,
    pub recipient: String,
    pub tickets: Vec<Ticket>,
}

#[derive(Clone)]
pub struct TicketDelivery {
    sender: Option<mpsc::Sender<DeliveryJob>>,
}

impl TicketDelivery {
    /// Starts the worker on the current runtime. It stops once every handle
    /// to the returned queue has been dropped and the backlog is drained.
    pub fn spawn(
        renderer: Arc<dyn DocumentRenderer>,
        notifier: Arc<dyn Notifier>,
        capacity: usize,
        retry: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, renderer, notifier, retry));
        (
            Self {
                sender: Some(sender),
            },
            worker,
        )
    }

    /// A queue that discards every job.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queues a job without waiting. Returns whether it was accepted.
    pub fn enqueue(&self, job: DeliveryJob) -> bool {
        let Some(sender) = &self.sender else {
            debug!(reservation_id = %job.reservation_id, "Delivery disabled, dropping job");
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    reservation_id = %job.reservation_id,
                    recipient = %job.recipient,
                    "Delivery queue full, tickets not sent"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(
                    reservation_id = %job.reservation_id,
                    "Delivery worker stopped, tickets not sent"
                );
                false
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<DeliveryJob>,
    renderer: Arc<dyn DocumentRenderer>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
) {
    info!("Ticket delivery worker started");
    while let Some(job) = receiver.recv().await {
        if let Err(err) = deliver(&job, renderer.as_ref(), notifier.as_ref(), &retry).await {
            warn!(
                reservation_id = %job.reservation_id,
                recipient = %job.recipient,
                error = %err,
                "Ticket delivery failed"
            );
        }
    }
    info!("Ticket delivery worker stopped");
}

async fn deliver(
    job: &DeliveryJob,
    renderer: &dyn DocumentRenderer,
    notifier: &dyn Notifier,
    retry: &RetryPolicy,
) -> Result<(), AppError> {
    let document = renderer.render_tickets(&job.tickets)?;
    let document = &document;
    retry
        .run_while("deliver_tickets", |_| true, move || async move {
            notifier.deliver_tickets(&job.recipient, document).await
        })
        .await?;
    debug!(
        reservation_id = %job.reservation_id,
        tickets = job.tickets.len(),
        "Tickets delivered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PlainTextRenderer;
    use crate::models::{ParticipantSnapshot, TicketStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FlakyNotifier {
        failures_left: AtomicU32,
        attempts: AtomicU32,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn deliver_tickets(&self, recipient: &str, _document: &[u8]) -> Result<(), AppError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(AppError::ExternalServiceError("smtp unavailable".into()));
            }
            self.delivered.lock().push(recipient.to_string());
            Ok(())
        }
    }

    fn job(recipient: &str) -> DeliveryJob {
        DeliveryJob {
            reservation_id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            tickets: vec![Ticket {
                id: Uuid::new_v4(),
                reservation_id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                audience_zone_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                participant: ParticipantSnapshot {
                    first_name: "Alan".into(),
                    last_name: "Turing".into(),
                    email: recipient.to_string(),
                },
                redemption_code: "code".into(),
                status: TicketStatus::Valid,
                issued_at: Utc::now(),
                validated_at: None,
            }],
        }
    }

    #[tokio::test]
    async fn failed_sends_are_retried() {
        let notifier = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(2),
            ..Default::default()
        });
        let (delivery, worker) = TicketDelivery::spawn(
            Arc::new(PlainTextRenderer),
            notifier.clone(),
            8,
            RetryPolicy::fixed(Duration::ZERO, 3),
        );

        assert!(delivery.enqueue(job("alan@example.com")));
        drop(delivery);
        worker.await.unwrap();

        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*notifier.delivered.lock(), vec!["alan@example.com".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_delivery_does_not_stop_the_worker() {
        let notifier = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(5),
            ..Default::default()
        });
        let (delivery, worker) = TicketDelivery::spawn(
            Arc::new(PlainTextRenderer),
            notifier.clone(),
            8,
            RetryPolicy::fixed(Duration::ZERO, 2),
        );

        delivery.enqueue(job("first@example.com"));
        delivery.enqueue(job("second@example.com"));
        delivery.enqueue(job("third@example.com"));
        drop(delivery);
        worker.await.unwrap();

        // 2 + 2 attempts fail, the fifth failure hits the third job, whose
        // second attempt goes through.
        assert_eq!(*notifier.delivered.lock(), vec!["third@example.com".to_string()]);
    }

    #[test]
    fn disabled_queue_accepts_nothing() {
        assert!(!TicketDelivery::disabled().enqueue(job("nobody@example.com")));
    }
}
