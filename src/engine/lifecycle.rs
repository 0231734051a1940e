use std::str::FromStr;

use crate::model::*;

use super::conflict::now_ms;
use super::{Engine, EngineError};

use crate::model::ReservationStatus::*;

/// Every legal status edge. Anything not listed is rejected.
pub const TRANSITIONS: &[(ReservationStatus, ReservationStatus)] = &[
    (Pending, Confirmed),
    (Pending, Cancelled),
    (Confirmed, Active),
    (Confirmed, Cancelled),
    (Active, Completed),
    (Active, Cancelled),
];

/// Requesting parties must cancel more than this long before the start.
pub const CANCELLATION_CUTOFF_MS: Ms = MS_PER_HOUR;

pub fn check_transition(from: ReservationStatus, to: ReservationStatus) -> Result<(), EngineError> {
    if TRANSITIONS.contains(&(from, to)) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

impl FromStr for ReservationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Pending),
            "confirmed" => Ok(Confirmed),
            "active" => Ok(Active),
            "completed" => Ok(Completed),
            "cancelled" => Ok(Cancelled),
            other => Err(EngineError::UnknownStatus(other.to_string())),
        }
    }
}

impl Engine {
    /// Owner-driven status change, validated against the stored status.
    pub async fn update_status(
        &self,
        id: ReservationId,
        acting_owner: UserId,
        to: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let (resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let current = guard
            .reservation(&id)
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        if current.owner_id != acting_owner {
            return Err(EngineError::Forbidden);
        }
        let from = current.status;
        check_transition(from, to)?;

        let event = Event::StatusChanged {
            id,
            resource_id,
            from,
            to,
            payment_status: current.payment_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .reservation(&id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        drop(guard);

        tracing::info!("reservation {} moved {from} -> {to} by owner {acting_owner}", updated.reference);
        metrics::counter!(crate::observability::STATUS_TRANSITIONS_TOTAL, "to" => to.as_str())
            .increment(1);
        self.announce_status_change(id, from, to).await;
        Ok(updated)
    }

    /// Cancellation by the requesting party, using the current wall clock.
    pub async fn cancel_by_requester(
        &self,
        id: ReservationId,
        requester: UserId,
    ) -> Result<Reservation, EngineError> {
        self.cancel_by_requester_at(id, requester, now_ms()).await
    }

    /// Cancellation by the requesting party as of `now`.
    ///
    /// Allowed only from pending/confirmed and only while `now < start - 1h`.
    /// Marks the payment refunded.
    pub async fn cancel_by_requester_at(
        &self,
        id: ReservationId,
        requester: UserId,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let (resource_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let current = guard
            .reservation(&id)
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        if current.requester_id != requester {
            return Err(EngineError::Forbidden);
        }
        let from = current.status;
        if !matches!(from, Pending | Confirmed) {
            return Err(EngineError::InvalidTransition { from, to: Cancelled });
        }
        if now >= current.span.start - CANCELLATION_CUTOFF_MS {
            return Err(EngineError::CancellationWindowClosed);
        }

        let event = Event::StatusChanged {
            id,
            resource_id,
            from,
            to: Cancelled,
            payment_status: PaymentStatus::Refunded,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .reservation(&id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        drop(guard);

        tracing::info!("reservation {} cancelled by requester {requester}", updated.reference);
        metrics::counter!(crate::observability::STATUS_TRANSITIONS_TOTAL, "to" => Cancelled.as_str())
            .increment(1);
        self.announce_status_change(id, from, Cancelled).await;
        Ok(updated)
    }
}
