use crate::limits::*;
use crate::model::*;

use super::conflict::{find_conflict, validate_span};
use super::pricing::price;
use super::{Engine, EngineError};

impl Engine {
    /// True when no pending/confirmed/active reservation overlaps `[start, end)`.
    pub async fn is_available(
        &self,
        resource_id: ResourceId,
        start: Ms,
        end: Ms,
    ) -> Result<bool, EngineError> {
        let span = validate_span(start, end)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or_else(|| EngineError::resource_not_found(resource_id))?;
        let guard = rs.read().await;
        Ok(find_conflict(&guard, &span).is_none())
    }

    /// Price preview for `[start, end)` under the resource's current rates.
    pub async fn quote(
        &self,
        resource_id: ResourceId,
        start: Ms,
        end: Ms,
    ) -> Result<Quote, EngineError> {
        let span = validate_span(start, end)?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or_else(|| EngineError::resource_not_found(resource_id))?;
        let guard = rs.read().await;
        price(resource_id, &guard.rates, &span)
    }

    pub async fn get_resource_info(&self, id: ResourceId) -> Option<ResourceInfo> {
        let rs = self.get_resource(&id)?;
        let guard = rs.read().await;
        Some(guard.info())
    }

    /// All resources ordered by id, optionally only those open for booking.
    pub async fn list_resources(&self, active_only: bool) -> Vec<ResourceInfo> {
        let handles: Vec<_> = self.resources.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(handles.len());
        for rs in handles {
            let guard = rs.read().await;
            if !active_only || guard.active {
                out.push(guard.info());
            }
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Option<Reservation> {
        let resource_id = self.get_resource_for_reservation(&id)?;
        let rs = self.get_resource(&resource_id)?;
        let guard = rs.read().await;
        guard.reservation(&id).cloned()
    }

    pub async fn find_by_reference(&self, reference: &str) -> Option<Reservation> {
        let id = self.references.get(reference).map(|e| *e.value())?;
        self.get_reservation(id).await
    }

    pub fn payment(&self, reservation_id: ReservationId) -> Option<PaymentRecord> {
        self.payments.get(&reservation_id).map(|e| e.value().clone())
    }

    /// Reservations made by `requester`, newest first.
    pub async fn reservations_for_requester(&self, requester: UserId) -> Vec<Reservation> {
        self.collect_reservations(|r| r.requester_id == requester).await
    }

    /// Reservations on resources owned by `owner`, newest first.
    pub async fn reservations_for_owner(&self, owner: UserId) -> Vec<Reservation> {
        self.collect_reservations(|r| r.owner_id == owner).await
    }

    /// Per-status counts and paid earnings over the owner's reservations.
    pub async fn owner_summary(&self, owner: UserId) -> OwnerStats {
        let handles: Vec<_> = self.resources.iter().map(|e| e.value().clone()).collect();
        let mut stats = OwnerStats::default();
        for rs in handles {
            let guard = rs.read().await;
            guard
                .reservations
                .iter()
                .filter(|r| r.owner_id == owner)
                .for_each(|r| stats.record(r));
        }
        stats
    }

    /// Every reservation (any status) touching `[start, end)` on a resource,
    /// ordered by start. Backs calendar views.
    pub async fn reservations_in_window(
        &self,
        resource_id: ResourceId,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<Reservation>, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidInterval);
        }
        if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self
            .get_resource(&resource_id)
            .ok_or_else(|| EngineError::resource_not_found(resource_id))?;
        let guard = rs.read().await;
        Ok(guard.overlapping(&Span::new(start, end)).cloned().collect())
    }

    async fn collect_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let handles: Vec<_> = self.resources.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            out.extend(guard.reservations.iter().filter(|r| keep(r)).cloned());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }
}
