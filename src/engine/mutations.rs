use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_span};
use super::pricing::price;
use super::{Engine, EngineError, WalCommand};

fn validate_spec(spec: &ResourceSpec) -> Result<(), EngineError> {
    if let Some(ref n) = spec.name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("resource name too long"));
    }
    if spec.rates.has_negative() {
        return Err(EngineError::InvalidRequest("rates must not be negative"));
    }
    if spec.available_units > spec.total_units {
        return Err(EngineError::InvalidRequest("available units exceed total units"));
    }
    Ok(())
}

/// Blank optional text is stored as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_booking_text(req: &BookingRequest) -> Result<(), EngineError> {
    if req.payment_method.trim().is_empty() {
        return Err(EngineError::InvalidRequest("payment method is required"));
    }
    if req.payment_method.len() > MAX_PAYMENT_METHOD_LEN {
        return Err(EngineError::LimitExceeded("payment method too long"));
    }
    let vehicle_fields = [&req.vehicle.number, &req.vehicle.model];
    if vehicle_fields
        .iter()
        .any(|f| f.as_ref().is_some_and(|v| v.len() > MAX_VEHICLE_FIELD_LEN))
    {
        return Err(EngineError::LimitExceeded("vehicle field too long"));
    }
    if let Some(ref s) = req.special_requests
        && s.len() > MAX_SPECIAL_REQUESTS_LEN
    {
        return Err(EngineError::LimitExceeded("special requests too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_resource(
        &self,
        id: ResourceId,
        owner_id: UserId,
        spec: ResourceSpec,
    ) -> Result<(), EngineError> {
        if self.resources.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        validate_spec(&spec)?;
        let _catalog = self.catalog.lock().await;
        if self.resources.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::resource_created(id, owner_id, spec.clone());
        self.wal_append(&event).await?;
        let rs = ResourceState::new(id, owner_id, spec);
        self.resources.insert(id, Arc::new(RwLock::new(rs)));
        tracing::info!("resource {id} listed by owner {owner_id}");
        Ok(())
    }

    /// Replace a resource's attributes. Existing reservations keep their
    /// frozen price; deactivating only stops new bookings.
    pub async fn update_resource(
        &self,
        id: ResourceId,
        acting_owner: UserId,
        spec: ResourceSpec,
    ) -> Result<(), EngineError> {
        validate_spec(&spec)?;
        let rs = self
            .get_resource(&id)
            .ok_or_else(|| EngineError::resource_not_found(id))?;
        let mut guard = rs.write().await;
        if guard.owner_id != acting_owner {
            return Err(EngineError::Forbidden);
        }

        let event = Event::ResourceUpdated {
            id,
            name: spec.name,
            rates: spec.rates,
            total_units: spec.total_units,
            available_units: spec.available_units,
            active: spec.active,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Create a reservation: availability → price → reference → persist → notify.
    ///
    /// The resource write lock is held from the availability check until the
    /// reservation is applied, so two overlapping requests on the same resource
    /// are serialised and the loser sees `SlotConflict`.
    pub async fn create_reservation(&self, req: BookingRequest) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.book(req).await;

        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => crate::observability::error_label(e),
        };
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(crate::observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        if let Ok(reservation) = &result {
            self.announce_booking_created(reservation.id).await;
        }
        result
    }

    async fn book(&self, req: BookingRequest) -> Result<Reservation, EngineError> {
        let span = validate_span(req.start, req.end)?;
        validate_booking_text(&req)?;

        let rs = self
            .get_resource(&req.resource_id)
            .ok_or_else(|| EngineError::resource_not_found(req.resource_id))?;
        let mut guard = rs.write().await;
        if !guard.active {
            return Err(EngineError::ResourceInactive(req.resource_id));
        }
        if guard.owner_id == req.requester_id {
            return Err(EngineError::SelfBooking);
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        check_no_conflict(&guard, &span)?;
        let quote = price(req.resource_id, &guard.rates, &span)?;

        let now = now_ms();
        let id = Ulid::new();
        let reference = self.claim_reference(id, now)?;

        let reservation = Reservation {
            id,
            reference: reference.clone(),
            resource_id: req.resource_id,
            requester_id: req.requester_id,
            owner_id: guard.owner_id,
            span,
            vehicle: Vehicle {
                number: non_blank(req.vehicle.number),
                model: non_blank(req.vehicle.model),
            },
            rate_type: quote.kind,
            rate_amount: quote.unit_rate,
            total_hours: round_2dp(quote.hours),
            total_amount: quote.total,
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            special_requests: non_blank(req.special_requests),
            payment_method: req.payment_method.trim().to_string(),
            reminder_sent: false,
            created_at: now,
        };
        let payment = PaymentRecord {
            reservation_id: id,
            transaction_id: reference.clone(),
            amount: quote.total,
            method: reservation.payment_method.clone(),
            status: PaymentStatus::Pending,
        };

        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
            payment,
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            self.references.remove(&reference);
            tracing::error!(
                "booking {reference} on resource {} failed to persist: {e}",
                req.resource_id
            );
            return Err(e);
        }

        tracing::info!(
            "booking {reference} created on resource {} for user {}: {} {} ({} h)",
            reservation.resource_id,
            reservation.requester_id,
            reservation.total_amount,
            reservation.rate_type.as_str(),
            reservation.total_hours
        );
        Ok(reservation)
    }

    /// Allocate a booking reference for `id`. The claim is atomic, so
    /// concurrent bookings can never share a reference.
    pub(super) fn claim_reference(&self, id: ReservationId, now: Ms) -> Result<String, EngineError> {
        self.reference_generator
            .generate(now, |code| match self.references.entry(code.to_string()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(id);
                    true
                }
            })
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    ///
    /// The catalog lock and read locks on every resource are held until the
    /// writer has swapped the file, so no commit can land between snapshot and swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let catalog = self.catalog.lock().await;
        let mut ids: Vec<ResourceId> = self.resources.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rs) = self.get_resource(&id) {
                guards.push(rs.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for rs in &guards {
            events.push(Event::resource_created(rs.id, rs.owner_id, rs.spec()));
            for reservation in &rs.reservations {
                let payment = self
                    .payments
                    .get(&reservation.id)
                    .map(|p| p.value().clone())
                    .unwrap_or_else(|| PaymentRecord {
                        reservation_id: reservation.id,
                        transaction_id: reservation.reference.clone(),
                        amount: reservation.total_amount,
                        method: reservation.payment_method.clone(),
                        status: reservation.payment_status,
                    });
                events.push(Event::ReservationCreated {
                    reservation: reservation.clone(),
                    payment,
                });
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::PersistenceFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::PersistenceFailure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
        drop(guards);
        drop(catalog);

        tracing::info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
