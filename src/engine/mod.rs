mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod pricing;
mod queries;
mod reference;
mod reminders;

pub use conflict::now_ms;
pub use error::EngineError;
pub use lifecycle::{check_transition, CANCELLATION_CUTOFF_MS, TRANSITIONS};
pub use pricing::price;
pub use reference::{ReferenceGenerator, DEFAULT_MAX_ATTEMPTS, DEFAULT_REFERENCE_PREFIX};
pub use reminders::REMINDER_WINDOW_MS;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::*;
use crate::notify::Notifier;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// Engine-level knobs. Process-level settings live in `crate::config`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reference_prefix: String,
    pub reference_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
            reference_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        // Non-append commands see the batch that preceded them.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// All-or-nothing: if any append or the fsync fails, the whole batch is
/// rolled back out of the file, since every caller in it is told it failed.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        tracing::error!("WAL batch of {} events failed, rolling back: {e}", batch.len());
        if let Err(rollback_err) = wal.rollback() {
            tracing::error!("WAL rollback failed: {rollback_err}");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The booking engine: authoritative reservation state for every resource.
///
/// Each resource sits behind its own `RwLock`. Every mutation holds the
/// resource's write lock across validate → journal append → apply, which is
/// what makes check-then-insert atomic per resource.
pub struct Engine {
    pub(super) resources: DashMap<ResourceId, SharedResourceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) notifier: Arc<dyn Notifier>,
    /// Reverse lookup: reservation id → resource id.
    pub(super) reservation_index: DashMap<ReservationId, ResourceId>,
    /// Booking reference → reservation id. Also holds in-progress claims.
    pub(super) references: DashMap<String, ReservationId>,
    pub(super) payments: DashMap<ReservationId, PaymentRecord>,
    /// Reservations whose reminder is being dispatched right now.
    pub(super) reminders_in_flight: DashSet<ReservationId>,
    pub(super) reference_generator: ReferenceGenerator,
    /// Serialises resource creation against compaction.
    pub(super) catalog: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notifier: Arc<dyn Notifier>) -> io::Result<Self> {
        Self::with_config(wal_path, notifier, EngineConfig::default())
    }

    /// Replay the journal at `wal_path` and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn with_config(
        wal_path: PathBuf,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            resources: DashMap::new(),
            wal_tx,
            notifier,
            reservation_index: DashMap::new(),
            references: DashMap::new(),
            payments: DashMap::new(),
            reminders_in_flight: DashSet::new(),
            reference_generator: ReferenceGenerator::new(
                config.reference_prefix,
                config.reference_max_attempts,
            ),
            catalog: tokio::sync::Mutex::new(()),
        };

        // Sole owner of these Arcs during replay, so try_write never contends.
        // blocking_write would panic inside an async context.
        for event in &events {
            match event {
                Event::ResourceCreated { id, owner_id, .. } => {
                    let rs = ResourceState::new(*id, *owner_id, ResourceSpec::new(RatePlans::default()));
                    engine.resources.insert(*id, Arc::new(RwLock::new(rs)));
                    engine.replay_into(*id, event);
                }
                other => engine.replay_into(other.resource_id(), other),
            }
        }
        tracing::info!(
            "engine replayed {} events: {} resources, {} reservations",
            events.len(),
            engine.resources.len(),
            engine.reservation_index.len()
        );

        Ok(engine)
    }

    fn replay_into(&self, resource_id: ResourceId, event: &Event) {
        let Some(rs) = self.get_resource(&resource_id) else {
            tracing::warn!("replay: event for unknown resource {resource_id} skipped");
            return;
        };
        match rs.try_write() {
            Ok(mut guard) => self.apply_to_resource(&mut guard, event),
            Err(_) => tracing::error!("replay: resource {resource_id} unexpectedly locked"),
        }
    }

    /// Apply a committed event to a resource (caller holds the write lock)
    /// and keep the engine-wide indexes in step.
    pub(super) fn apply_to_resource(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::ResourceCreated {
                name,
                rates,
                total_units,
                available_units,
                active,
                ..
            }
            | Event::ResourceUpdated {
                name,
                rates,
                total_units,
                available_units,
                active,
                ..
            } => {
                rs.apply_spec(ResourceSpec {
                    name: name.clone(),
                    rates: rates.clone(),
                    total_units: *total_units,
                    available_units: *available_units,
                    active: *active,
                });
            }
            Event::ReservationCreated {
                reservation,
                payment,
            } => {
                self.reservation_index
                    .insert(reservation.id, reservation.resource_id);
                self.references
                    .insert(reservation.reference.clone(), reservation.id);
                self.payments.insert(reservation.id, payment.clone());
                rs.insert_reservation(reservation.clone());
            }
            Event::StatusChanged {
                id,
                to,
                payment_status,
                ..
            } => {
                if let Some(r) = rs.reservation_mut(id) {
                    r.status = *to;
                    r.payment_status = *payment_status;
                }
                if let Some(mut p) = self.payments.get_mut(id) {
                    p.status = *payment_status;
                }
            }
            Event::ReminderSent { id, .. } => {
                if let Some(r) = rs.reservation_mut(id) {
                    r.reminder_sent = true;
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::PersistenceFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::PersistenceFailure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))
    }

    /// WAL-append then apply. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_resource(rs, event);
        Ok(())
    }

    pub fn get_resource(&self, id: &ResourceId) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_reservation(&self, id: &ReservationId) -> Option<ResourceId> {
        self.reservation_index.get(id).map(|e| *e.value())
    }

    /// Lookup reservation → resource, acquire the resource write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: &ReservationId,
    ) -> Result<(ResourceId, tokio::sync::OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        let resource_id = self
            .get_resource_for_reservation(id)
            .ok_or_else(|| EngineError::reservation_not_found(*id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or_else(|| EngineError::resource_not_found(resource_id))?;
        Ok((resource_id, rs.write_owned().await))
    }

    // ── Best-effort notifications ────────────────────────────

    pub(super) async fn announce_booking_created(&self, id: ReservationId) {
        if let Err(e) = self.notifier.notify_booking_created(id).await {
            tracing::warn!("booking-created notification for {id} failed: {e}");
            metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL, "kind" => "booking_created")
                .increment(1);
        }
    }

    pub(super) async fn announce_status_change(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) {
        if let Err(e) = self.notifier.notify_status_changed(id, from, to).await {
            tracing::warn!("status notification for {id} ({from} -> {to}) failed: {e}");
            metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL, "kind" => "status_changed")
                .increment(1);
        }
    }
}
