use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::warn;

use crate::model::Ms;

use super::EngineError;

pub const DEFAULT_REFERENCE_PREFIX: &str = "PK";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Re-checks of the timestamp-based code before giving up.
const FALLBACK_ATTEMPTS: u32 = 3;

/// Produces human-shareable booking references.
///
/// Regular form: `<prefix><8 hex chars><YYMM>`, e.g. `PK3FA09C1D2610`.
/// After `max_attempts` collisions it falls back to
/// `<prefix><YYYYMMDDhhmmss><3 digits>`, which is also claimed before use.
/// Never loops unbounded: when both phases fail the caller gets
/// `ReferenceExhausted`.
#[derive(Debug, Clone)]
pub struct ReferenceGenerator {
    prefix: String,
    max_attempts: u32,
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_PREFIX, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a reference, using `claim` as the uniqueness check.
    ///
    /// `claim` must atomically reserve the code and return `false` if it was
    /// already taken, so concurrent callers can never receive the same value.
    pub fn generate(
        &self,
        now: Ms,
        mut claim: impl FnMut(&str) -> bool,
    ) -> Result<String, EngineError> {
        let at = DateTime::<Utc>::from_timestamp_millis(now).unwrap_or_default();
        let mut rng = rand::thread_rng();

        let year_month = at.format("%y%m").to_string();
        for _ in 0..self.max_attempts {
            let code = format!("{}{:08X}{}", self.prefix, rng.r#gen::<u32>(), year_month);
            if claim(&code) {
                return Ok(code);
            }
        }

        warn!(
            "booking reference: {} random codes collided, using timestamp fallback",
            self.max_attempts
        );
        metrics::counter!(crate::observability::REFERENCE_FALLBACKS_TOTAL).increment(1);

        let stamp = at.format("%Y%m%d%H%M%S").to_string();
        for _ in 0..FALLBACK_ATTEMPTS {
            let code = format!("{}{}{}", self.prefix, stamp, rng.gen_range(100..1000));
            if claim(&code) {
                return Ok(code);
            }
        }

        Err(EngineError::ReferenceExhausted)
    }
}
