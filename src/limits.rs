use crate::model::Ms;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
/// One (leap) year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;
/// Widest window accepted by calendar queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * MAX_SPAN_DURATION_MS;

pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 100_000;
pub const MAX_RESOURCES: usize = 1_000_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_VEHICLE_FIELD_LEN: usize = 64;
pub const MAX_SPECIAL_REQUESTS_LEN: usize = 2_048;
pub const MAX_PAYMENT_METHOD_LEN: usize = 64;
pub const MAX_REFERENCE_PREFIX_LEN: usize = 8;
