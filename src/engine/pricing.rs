use rust_decimal::Decimal;

use crate::model::*;

use super::EngineError;

fn checked_total(quantity: Decimal, rate: Decimal) -> Result<Decimal, EngineError> {
    quantity
        .checked_mul(rate)
        .ok_or(EngineError::LimitExceeded("price exceeds representable amount"))
}

/// Price `span` against a rate snapshot, picking the cheaper of hourly and daily.
///
/// - An hourly rate is mandatory; without it nothing can be booked.
/// - Daily is only considered for spans of 24h or more, charged per started day.
/// - On an exact tie daily wins.
/// - Monthly rates are never selected here.
///
/// The total is rounded to 2dp, half away from zero.
pub fn price(resource_id: ResourceId, rates: &RatePlans, span: &Span) -> Result<Quote, EngineError> {
    if span.end <= span.start {
        return Err(EngineError::InvalidInterval);
    }
    let hourly = rates.hourly.ok_or(EngineError::NoRateAvailable(resource_id))?;

    let hours_per_day = Decimal::from(24);
    let hours = span.hours();
    let hourly_total = checked_total(hours, hourly)?;

    let (kind, unit_rate, total) = match rates.daily {
        Some(daily) if hours >= hours_per_day => {
            let days = (hours / hours_per_day).ceil();
            let daily_total = checked_total(days, daily)?;
            if daily_total <= hourly_total {
                (RateKind::Daily, daily, daily_total)
            } else {
                (RateKind::Hourly, hourly, hourly_total)
            }
        }
        _ => (RateKind::Hourly, hourly, hourly_total),
    };

    Ok(Quote {
        kind,
        unit_rate,
        hours,
        total: round_2dp(total),
    })
}
