use crate::error::FeeError;
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

/// Puts `months` in the order they appear in `existing_order`.
///
/// Months missing from the reference keep their relative order and follow
/// the referenced ones. An empty reference keeps `months` as given.
pub fn reorder_months(months: &[u32], existing_order: &[u32]) -> Vec<u32> {
    let mut ordered = months.to_vec();
    if existing_order.is_empty() {
        return ordered;
    }
    ordered.sort_by_key(|m| {
        existing_order
            .iter()
            .position(|r| r == m)
            .unwrap_or(usize::MAX)
    });
    ordered
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
}

/// Due date for `day` in the given month; days past the end of the month
/// clamp to its last day (day 31 in February gives the 28th or 29th).
fn clamped_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, FeeError> {
    let last = days_in_month(year, month)
        .ok_or_else(|| FeeError::validation(format!("Invalid month {}/{}", month, year)))?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
        .ok_or_else(|| FeeError::validation(format!("Invalid date {}/{}/{}", day, month, year)))
}

fn validate(months: &[u32], day: u32, existing_order: &[u32]) -> Result<(), FeeError> {
    if months.is_empty() {
        return Err(FeeError::validation("At least one month is required"));
    }
    if !(1..=31).contains(&day) {
        return Err(FeeError::validation(format!(
            "Day must be between 1 and 31, got {}",
            day
        )));
    }
    if let Some(m) = months
        .iter()
        .chain(existing_order)
        .find(|m| !(1..=12).contains(*m))
    {
        return Err(FeeError::validation(format!(
            "Month must be between 1 and 12, got {}",
            m
        )));
    }
    let unique: HashSet<_> = months.iter().collect();
    if unique.len() != months.len() {
        return Err(FeeError::validation("Months must not repeat"));
    }
    Ok(())
}

/// Concrete due dates for a schedule, one per month, in fiscal order.
///
/// Returns the reordered months alongside the dates. A month earlier than
/// the first month of the reordered list falls in `current_year + 1`.
pub fn compute_scheduled_dates(
    months: &[u32],
    day: u32,
    existing_order: &[u32],
    current_year: i32,
) -> Result<(Vec<u32>, Vec<NaiveDate>), FeeError> {
    validate(months, day, existing_order)?;

    let ordered = reorder_months(months, existing_order);
    let first = ordered[0];

    let dates = ordered
        .iter()
        .map(|&month| {
            let year = if month >= first {
                current_year
            } else {
                current_year + 1
            };
            clamped_date(year, month, day)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((ordered, dates))
}
