use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC. The only time type.
pub type Ms = i64;

/// Identifier of a parking space, assigned by the listing side.
pub type ResourceId = u64;

/// Identifier of a principal (owner or requesting party).
pub type UserId = u64;

/// Internal reservation identifier. Not shown to users; see `Reservation::reference`.
pub type ReservationId = Ulid;

pub const MS_PER_HOUR: Ms = 3_600_000;

/// Round a monetary or duration amount to 2dp, half away from zero.
pub fn round_2dp(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Exact fractional hours covered by the span.
    pub fn hours(&self) -> Decimal {
        Decimal::from(self.duration_ms()) / Decimal::from(MS_PER_HOUR)
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Optional pricing tiers offered by a resource. `None` means "not offered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePlans {
    pub hourly: Option<Decimal>,
    pub daily: Option<Decimal>,
    /// Stored for display and manual long-term deals; never selected automatically.
    pub monthly: Option<Decimal>,
}

impl RatePlans {
    pub fn hourly(rate: Decimal) -> Self {
        Self {
            hourly: Some(rate),
            ..Self::default()
        }
    }

    pub fn with_daily(mut self, rate: Decimal) -> Self {
        self.daily = Some(rate);
        self
    }

    pub fn with_monthly(mut self, rate: Decimal) -> Self {
        self.monthly = Some(rate);
        self
    }

    pub fn has_negative(&self) -> bool {
        [self.hourly, self.daily, self.monthly]
            .iter()
            .flatten()
            .any(|r| *r < Decimal::ZERO)
    }
}

/// Rate plan a reservation was priced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateKind {
    Hourly,
    Daily,
}

impl RateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateKind::Hourly => "hourly",
            RateKind::Daily => "daily",
        }
    }
}

/// Outcome of pricing an interval against a rate snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub kind: RateKind,
    pub unit_rate: Decimal,
    /// Unrounded hours; round with `round_2dp` before storing.
    pub hours: Decimal,
    /// Already rounded to 2dp.
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Active => "active",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a reservation in this status holds its interval on the resource.
    pub fn blocks_interval(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::Active
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub number: Option<String>,
    pub model: Option<String>,
}

/// A reservation with its frozen price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    /// Human-shareable booking reference, unique and immutable.
    pub reference: String,
    pub resource_id: ResourceId,
    pub requester_id: UserId,
    /// Copy of the resource owner at creation time.
    pub owner_id: UserId,
    pub span: Span,
    pub vehicle: Vehicle,
    pub rate_type: RateKind,
    pub rate_amount: Decimal,
    pub total_hours: Decimal,
    pub total_amount: Decimal,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub special_requests: Option<String>,
    pub payment_method: String,
    pub reminder_sent: bool,
    pub created_at: Ms,
}

/// Ledger entry created alongside each reservation. No gateway behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub reservation_id: ReservationId,
    /// Correlation id: the booking reference.
    pub transaction_id: String,
    pub amount: Decimal,
    pub method: String,
    pub status: PaymentStatus,
}

/// Inbound booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: ResourceId,
    pub requester_id: UserId,
    pub start: Ms,
    pub end: Ms,
    pub vehicle: Vehicle,
    pub special_requests: Option<String>,
    pub payment_method: String,
}

/// Owner-editable resource attributes, used for both creation and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: Option<String>,
    pub rates: RatePlans,
    pub total_units: u32,
    pub available_units: u32,
    pub active: bool,
}

impl ResourceSpec {
    pub fn new(rates: RatePlans) -> Self {
        Self {
            name: None,
            rates,
            total_units: 1,
            available_units: 1,
            active: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: ResourceId,
    pub owner_id: UserId,
    pub name: Option<String>,
    pub rates: RatePlans,
    pub total_units: u32,
    /// Informational; availability is decided per interval.
    pub available_units: u32,
    pub active: bool,
    /// All reservations ever made on this resource, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl ResourceState {
    pub fn new(id: ResourceId, owner_id: UserId, spec: ResourceSpec) -> Self {
        Self {
            id,
            owner_id,
            name: spec.name,
            rates: spec.rates,
            total_units: spec.total_units,
            available_units: spec.available_units,
            active: spec.active,
            reservations: Vec::new(),
        }
    }

    pub fn apply_spec(&mut self, spec: ResourceSpec) {
        self.name = spec.name;
        self.rates = spec.rates;
        self.total_units = spec.total_units;
        self.available_units = spec.available_units;
        self.active = spec.active;
    }

    pub fn spec(&self) -> ResourceSpec {
        ResourceSpec {
            name: self.name.clone(),
            rates: self.rates.clone(),
            total_units: self.total_units,
            available_units: self.available_units,
            active: self.active,
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: &ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Reservations (any status) whose span overlaps the query window.
    /// Everything at index >= right_bound starts at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name.clone(),
            rates: self.rates.clone(),
            total_units: self.total_units,
            available_units: self.available_units,
            active: self.active,
        }
    }
}

/// Journal record format. One event per committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: ResourceId,
        owner_id: UserId,
        name: Option<String>,
        rates: RatePlans,
        total_units: u32,
        available_units: u32,
        active: bool,
    },
    ResourceUpdated {
        id: ResourceId,
        name: Option<String>,
        rates: RatePlans,
        total_units: u32,
        available_units: u32,
        active: bool,
    },
    /// Reservation and its payment record commit together.
    ReservationCreated {
        reservation: Reservation,
        payment: PaymentRecord,
    },
    StatusChanged {
        id: ReservationId,
        resource_id: ResourceId,
        from: ReservationStatus,
        to: ReservationStatus,
        payment_status: PaymentStatus,
    },
    ReminderSent {
        id: ReservationId,
        resource_id: ResourceId,
    },
}

impl Event {
    pub fn resource_created(id: ResourceId, owner_id: UserId, spec: ResourceSpec) -> Self {
        Event::ResourceCreated {
            id,
            owner_id,
            name: spec.name,
            rates: spec.rates,
            total_units: spec.total_units,
            available_units: spec.available_units,
            active: spec.active,
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        match self {
            Event::ResourceCreated { id, .. } | Event::ResourceUpdated { id, .. } => *id,
            Event::ReservationCreated { reservation, .. } => reservation.resource_id,
            Event::StatusChanged { resource_id, .. } | Event::ReminderSent { resource_id, .. } => {
                *resource_id
            }
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub owner_id: UserId,
    pub name: Option<String>,
    pub rates: RatePlans,
    pub total_units: u32,
    pub available_units: u32,
    pub active: bool,
}

/// Owner dashboard figures across every reservation on the owner's resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerStats {
    pub pending: usize,
    pub confirmed: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Sum of `total_amount` over reservations whose payment is `paid`.
    pub total_earned: Decimal,
}

impl OwnerStats {
    pub fn record(&mut self, r: &Reservation) {
        let count = match r.status {
            ReservationStatus::Pending => &mut self.pending,
            ReservationStatus::Confirmed => &mut self.confirmed,
            ReservationStatus::Active => &mut self.active,
            ReservationStatus::Completed => &mut self.completed,
            ReservationStatus::Cancelled => &mut self.cancelled,
        };
        *count += 1;
        if r.payment_status == PaymentStatus::Paid {
            self.total_earned = self.total_earned.saturating_add(r.total_amount);
        }
    }
}
