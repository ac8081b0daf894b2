use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::*;

use super::conflict::check_dates;

// ── Availability Resolver ────────────────────────────────────────
//
// The only place that unions reservations and blocked ranges. Calendar
// queries and the booking path both come through here, so they cannot drift.

/// Decide whether `interval` can be booked on this calendar.
///
/// Checks run in a fixed order: date sanity, then active reservations
/// (skipping `exclude`), then admin blocks. The first hit is the reason.
pub fn resolve(
    cal: &PropertyCalendar,
    interval: &Interval,
    exclude: Option<ReservationId>,
    today: NaiveDate,
) -> Availability {
    if let Err(invalid) = check_dates(interval, today)
        && let Some(reason) = invalid.as_unavailable()
    {
        return Availability::unavailable(reason);
    }
    if cal.active_overlapping(interval, exclude).next().is_some() {
        return Availability::unavailable(Unavailable::AlreadyBooked);
    }
    if cal.blocked_overlapping(interval).next().is_some() {
        return Availability::unavailable(Unavailable::BlockedByOwner);
    }
    Availability::free()
}

/// First blocked range overlapping `interval`, by start date.
pub fn first_block(cal: &PropertyCalendar, interval: &Interval) -> BlockCheck {
    let matched_range = cal.blocked_overlapping(interval).next().cloned();
    BlockCheck {
        blocked: matched_range.is_some(),
        matched_range,
    }
}

/// Every day inside `window` that is held by an active reservation or an
/// admin block, ascending and without duplicates. Feeds the date picker.
pub fn unavailable_days(cal: &PropertyCalendar, window: &Interval) -> Vec<NaiveDate> {
    let held = cal
        .active_overlapping(window, None)
        .map(|r| r.interval)
        .chain(cal.blocked_overlapping(window).map(|b| b.interval));

    let mut days = BTreeSet::new();
    for interval in held {
        // Clamped ranges may collapse to a single day, so no Interval::new here.
        let clamped = Interval {
            start: interval.start.max(window.start),
            end: interval.end.min(window.end),
        };
        days.extend(clamped.days());
    }
    days.into_iter().collect()
}
