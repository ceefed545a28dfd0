use chrono::{Days, Months, NaiveDate};

use crate::error::{LebaroneError, Result};
use crate::models::{FrequencyUnit, RecurringDefinition};

pub fn validate_interval(interval: u32) -> Result<()> {
    if interval == 0 {
        return Err(LebaroneError::InvalidCadence(
            "interval must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Date of the occurrence following `date` for the given cadence.
///
/// Month and year steps keep the day-of-month when the target month has it
/// and otherwise clamp to that month's last day (Jan 31 + 1 month = Feb 28/29,
/// Feb 29 + 1 year = Feb 28 in a common year).
pub fn compute_next_occurrence(
    date: NaiveDate,
    unit: FrequencyUnit,
    interval: u32,
) -> Result<NaiveDate> {
    validate_interval(interval)?;
    let next = match unit {
        FrequencyUnit::Day => date.checked_add_days(Days::new(u64::from(interval))),
        FrequencyUnit::Week => date.checked_add_days(Days::new(u64::from(interval) * 7)),
        FrequencyUnit::Month => date.checked_add_months(Months::new(interval)),
        FrequencyUnit::Year => interval
            .checked_mul(12)
            .and_then(|months| date.checked_add_months(Months::new(months))),
    };
    next.ok_or_else(|| {
        LebaroneError::DateOutOfRange(format!("{date} + {interval} {unit}"))
    })
}

/// The next `count` occurrences of a definition starting at its cursor,
/// stopping early at `end_date`. Does not touch the definition.
pub fn upcoming_occurrences(def: &RecurringDefinition, count: usize) -> Result<Vec<NaiveDate>> {
    validate_interval(def.interval)?;
    let mut cursor = def.next_due_date.max(def.start_date);
    let mut dates = Vec::with_capacity(count);
    while dates.len() < count {
        if def.end_date.is_some_and(|end| cursor > end) {
            break;
        }
        dates.push(cursor);
        cursor = compute_next_occurrence(cursor, def.frequency, def.interval)?;
    }
    Ok(dates)
}
