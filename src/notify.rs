use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{ReservationId, ReservationStatus};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum NotifyError {
    /// Nobody is subscribed to deliver the message.
    NoSubscribers,
    Delivery(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::NoSubscribers => write!(f, "no delivery worker subscribed"),
            NotifyError::Delivery(e) => write!(f, "delivery failed: {e}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification collaborator.
///
/// Every call carries only the reservation id; the implementation loads
/// whatever it needs and owns the delivery channel. The engine treats all
/// failures as best-effort: they are logged and never fail the operation
/// that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_booking_created(&self, reservation_id: ReservationId) -> Result<(), NotifyError>;

    async fn notify_status_changed(
        &self,
        reservation_id: ReservationId,
        old_status: ReservationStatus,
        new_status: ReservationStatus,
    ) -> Result<(), NotifyError>;

    async fn notify_reminder(&self, reservation_id: ReservationId) -> Result<(), NotifyError>;
}

/// A notification as handed to delivery workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    BookingCreated {
        reservation_id: ReservationId,
    },
    StatusChanged {
        reservation_id: ReservationId,
        old_status: ReservationStatus,
        new_status: ReservationStatus,
    },
    Reminder {
        reservation_id: ReservationId,
    },
}

impl Notification {
    pub fn reservation_id(&self) -> ReservationId {
        match self {
            Notification::BookingCreated { reservation_id }
            | Notification::StatusChanged { reservation_id, .. }
            | Notification::Reminder { reservation_id } => *reservation_id,
        }
    }

    /// JSON payload for delivery workers.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Broadcast hub: fans notifications out to subscribed delivery workers
/// (mailer, push, audit log). Sending with no subscriber is a failure, so a
/// reminder is retried rather than silently dropped.
pub struct NotifyHub {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sender
            .send(notification)
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers)
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn notify_booking_created(&self, reservation_id: ReservationId) -> Result<(), NotifyError> {
        self.send(Notification::BookingCreated { reservation_id })
    }

    async fn notify_status_changed(
        &self,
        reservation_id: ReservationId,
        old_status: ReservationStatus,
        new_status: ReservationStatus,
    ) -> Result<(), NotifyError> {
        self.send(Notification::StatusChanged {
            reservation_id,
            old_status,
            new_status,
        })
    }

    async fn notify_reminder(&self, reservation_id: ReservationId) -> Result<(), NotifyError> {
        self.send(Notification::Reminder { reservation_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();

        let id = Ulid::new();
        hub.notify_status_changed(id, ReservationStatus::Pending, ReservationStatus::Confirmed)
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received,
            Notification::StatusChanged {
                reservation_id: id,
                old_status: ReservationStatus::Pending,
                new_status: ReservationStatus::Confirmed,
            }
        );
        assert_eq!(received.reservation_id(), id);
    }

    #[tokio::test]
    async fn send_without_subscribers_fails() {
        let hub = NotifyHub::new();
        let result = hub.notify_reminder(Ulid::new()).await;
        assert!(matches!(result, Err(NotifyError::NoSubscribers)));
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let hub = NotifyHub::new();
        let mut mailer = hub.subscribe();
        let mut audit = hub.subscribe();

        let id = Ulid::new();
        hub.notify_booking_created(id).await.unwrap();

        let expected = Notification::BookingCreated { reservation_id: id };
        assert_eq!(mailer.recv().await.unwrap(), expected);
        assert_eq!(audit.recv().await.unwrap(), expected);
    }

    #[test]
    fn payload_is_tagged_json() {
        let id = Ulid::new();
        let payload = Notification::Reminder { reservation_id: id }.to_payload();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["kind"], "reminder");
        assert_eq!(value["reservation_id"], id.to_string());
    }
}
