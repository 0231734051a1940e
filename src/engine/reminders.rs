use crate::model::*;

use super::{Engine, EngineError};

/// Reminders go out for reservations starting within this long of `now`.
pub const REMINDER_WINDOW_MS: Ms = MS_PER_HOUR;

fn reminder_due(r: &Reservation, now: Ms) -> bool {
    matches!(r.status, ReservationStatus::Confirmed | ReservationStatus::Active)
        && !r.reminder_sent
        && r.span.start >= now
        && r.span.start <= now + REMINDER_WINDOW_MS
}

/// Releases the in-flight claim on drop, whatever path the sweep takes.
struct InFlight<'a> {
    engine: &'a Engine,
    id: ReservationId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.engine.reminders_in_flight.remove(&self.id);
    }
}

impl Engine {
    /// Reservations whose reminder is due at `now`.
    pub async fn collect_due_reminders(&self, now: Ms) -> Vec<(ReservationId, ResourceId)> {
        let handles: Vec<_> = self.resources.iter().map(|e| e.value().clone()).collect();
        let mut due = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            let window = Span::new(now, now + REMINDER_WINDOW_MS + 1);
            for r in guard.overlapping(&window) {
                if reminder_due(r, now) {
                    due.push((r.id, guard.id));
                }
            }
        }
        due
    }

    /// One reminder pass. Returns the number of reminders dispatched.
    ///
    /// Per reservation: claim it in-process, re-check it is still due,
    /// dispatch, then flip the flag only if it is still unset. A failed
    /// dispatch leaves the flag unset so the next sweep retries. A crash
    /// between dispatch and flag write can repeat a reminder; two sweeps in
    /// the same process never both dispatch for one reservation.
    pub async fn sweep_reminders(&self, now: Ms) -> usize {
        let mut sent = 0;
        for (id, resource_id) in self.collect_due_reminders(now).await {
            if !self.reminders_in_flight.insert(id) {
                tracing::debug!("reminder for {id} already in flight");
                continue;
            }
            let _claim = InFlight { engine: self, id };

            if !self.still_due(resource_id, id, now).await {
                continue;
            }

            if let Err(e) = self.notifier.notify_reminder(id).await {
                tracing::warn!("reminder for {id} failed, will retry next sweep: {e}");
                metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL, "kind" => "reminder")
                    .increment(1);
                continue;
            }
            sent += 1;
            metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL).increment(1);

            match self.mark_reminder_sent(resource_id, id).await {
                Ok(true) => tracing::info!("reminder sent for reservation {id}"),
                Ok(false) => tracing::debug!("reminder flag for {id} was already set"),
                Err(e) => tracing::error!("reminder for {id} sent but flag not persisted: {e}"),
            }
        }
        sent
    }

    async fn still_due(&self, resource_id: ResourceId, id: ReservationId, now: Ms) -> bool {
        let Some(rs) = self.get_resource(&resource_id) else {
            return false;
        };
        let guard = rs.read().await;
        guard.reservation(&id).is_some_and(|r| reminder_due(r, now))
    }

    /// Conditional flag write: set only where unset. Returns whether it flipped.
    async fn mark_reminder_sent(
        &self,
        resource_id: ResourceId,
        id: ReservationId,
    ) -> Result<bool, EngineError> {
        let rs = self
            .get_resource(&resource_id)
            .ok_or_else(|| EngineError::resource_not_found(resource_id))?;
        let mut guard = rs.write().await;
        let already = guard
            .reservation(&id)
            .ok_or_else(|| EngineError::reservation_not_found(id))?
            .reminder_sent;
        if already {
            return Ok(false);
        }
        let event = Event::ReminderSent { id, resource_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }
}
