use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::time_entry::TimeEntry;

const SECONDS_PER_HOUR: i64 = 3600;
const MAX_MANUAL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectTotals {
    pub total_hours: Decimal,
    pub billable_hours: Decimal,
    pub billable_amount: Decimal,
}

/// Derived-field arithmetic shared by the timer engine and its read paths.
pub struct BillingService;

impl BillingService {
    /// Whole seconds between `start` and `end`, truncated toward zero.
    pub fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        (end - start).num_seconds()
    }

    pub fn hours(seconds: i64) -> Decimal {
        Decimal::from(seconds) / Decimal::from(SECONDS_PER_HOUR)
    }

    pub fn round2(value: Decimal) -> Decimal {
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Entry override, then the project default, then zero.
    pub fn effective_rate(entry_rate: Option<Decimal>, project_rate: Option<Decimal>) -> Decimal {
        entry_rate.or(project_rate).unwrap_or(Decimal::ZERO)
    }

    pub fn duration_hours(entry: &TimeEntry) -> Option<Decimal> {
        entry
            .duration_seconds
            .map(|secs| Self::round2(Self::hours(secs)))
    }

    fn raw_amount(entry: &TimeEntry, project_rate: Option<Decimal>) -> Option<Decimal> {
        if !entry.billable {
            return None;
        }
        let secs = entry.duration_seconds?;
        Some(Self::hours(secs) * Self::effective_rate(entry.hourly_rate, project_rate))
    }

    /// Billable value of a single entry. Absent for non-billable or running entries.
    pub fn amount(entry: &TimeEntry, project_rate: Option<Decimal>) -> Option<Decimal> {
        Self::raw_amount(entry, project_rate).map(Self::round2)
    }

    pub fn project_totals<'a, I>(entries: I, project_rate: Option<Decimal>) -> ProjectTotals
    where
        I: IntoIterator<Item = &'a TimeEntry>,
    {
        let mut total_seconds: i64 = 0;
        let mut billable_seconds: i64 = 0;
        let mut billable_amount = Decimal::ZERO;

        for entry in entries {
            let Some(secs) = entry.duration_seconds else {
                continue;
            };
            total_seconds += secs;
            if entry.billable {
                billable_seconds += secs;
                billable_amount += Self::raw_amount(entry, project_rate).unwrap_or_default();
            }
        }

        ProjectTotals {
            total_hours: Self::round2(Self::hours(total_seconds)),
            billable_hours: Self::round2(Self::hours(billable_seconds)),
            billable_amount: Self::round2(billable_amount),
        }
    }

    /// End of a manual entry. `duration_hours` must lie in (0, 24].
    pub fn manual_end_time(start: DateTime<Utc>, duration_hours: Decimal) -> Result<DateTime<Utc>> {
        if duration_hours <= Decimal::ZERO || duration_hours > Decimal::from(MAX_MANUAL_HOURS) {
            return Err(Error::Invalid(format!(
                "duration_hours must be greater than 0 and at most {}",
                MAX_MANUAL_HOURS
            )));
        }
        let seconds = (duration_hours * Decimal::from(SECONDS_PER_HOUR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0);
        if seconds <= 0 {
            return Err(Error::Invalid(
                "duration_hours is shorter than one second".to_string(),
            ));
        }
        Ok(start + Duration::seconds(seconds))
    }

    /// Checks an edited start/end pair against the same bounds as manual entries.
    pub fn check_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        let secs = Self::duration_seconds(start, end);
        if secs <= 0 {
            return Err(Error::Invalid("end_time must be after start_time".to_string()));
        }
        if secs > MAX_MANUAL_HOURS * SECONDS_PER_HOUR {
            return Err(Error::Invalid(format!(
                "an entry cannot span more than {} hours",
                MAX_MANUAL_HOURS
            )));
        }
        Ok(())
    }
}
