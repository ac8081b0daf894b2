use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::limits::*;
use crate::model::*;

use super::error::Invalid;
use super::EngineError;

/// Ordering and not-in-the-past checks shared by every dated write.
pub(crate) fn check_dates(interval: &Interval, today: NaiveDate) -> Result<(), Invalid> {
    if !interval.is_ordered() {
        return Err(Invalid::EndBeforeStart);
    }
    if interval.start < today {
        return Err(Invalid::StartInPast);
    }
    Ok(())
}

/// Date checks for a stay. A past check-in is reported as such whatever the
/// check-out date says.
pub(crate) fn check_stay_dates(interval: &Interval, today: NaiveDate) -> Result<(), Invalid> {
    if interval.start < today {
        return Err(Invalid::StartInPast);
    }
    check_dates(interval, today)
}

/// Range-size limits. Assumes `check_dates` passed.
pub(crate) fn check_extent(
    interval: &Interval,
    today: NaiveDate,
    max_days: i64,
) -> Result<(), EngineError> {
    if interval.nights() > max_days {
        return Err(EngineError::LimitExceeded("date range too long"));
    }
    if (interval.start - today).num_days() > MAX_BOOKING_HORIZON_DAYS {
        return Err(EngineError::LimitExceeded("start too far in the future"));
    }
    Ok(())
}

pub(crate) fn check_reason(reason: Option<&str>) -> Result<(), EngineError> {
    if reason.is_some_and(|r| r.len() > MAX_REASON_LEN) {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

/// Rental listing in AVAILABLE status. Cheap, so the booking path runs it first.
pub(crate) fn check_bookable(property: &Property) -> Result<(), Invalid> {
    if !property.is_rental_listing() {
        return Err(Invalid::NotRentalListing);
    }
    if property.status != PropertyStatus::Available {
        return Err(Invalid::PropertyNotAvailable(property.status));
    }
    Ok(())
}

fn is_blank(v: &Option<String>) -> bool {
    v.as_deref().is_none_or(|s| s.trim().is_empty())
}

fn looks_like_email(s: &str) -> bool {
    /// Dot-atom local part, then dot-separated hostname labels and an
    /// alphabetic top-level label.
    static REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
        )
        .expect("valid regex")
    });
    REGEX.is_match(s)
}

pub(crate) fn check_contact(contact: &ContactDetails) -> Result<(), EngineError> {
    if [&contact.name, &contact.email, &contact.phone, &contact.country]
        .into_iter()
        .flatten()
        .any(|v| v.len() > MAX_CONTACT_FIELD_LEN)
    {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if let Some(email) = contact.email.as_deref()
        && !email.trim().is_empty()
        && !looks_like_email(email.trim())
    {
        return Err(Invalid::MalformedEmail.into());
    }
    Ok(())
}

/// An anonymous booking must name, reach and call the guest.
pub(crate) fn guest_contact(contact: ContactDetails) -> Result<GuestContact, EngineError> {
    check_contact(&contact)?;
    if is_blank(&contact.name) {
        return Err(Invalid::MissingGuestField("name").into());
    }
    if is_blank(&contact.email) {
        return Err(Invalid::MissingGuestField("email").into());
    }
    if is_blank(&contact.phone) {
        return Err(Invalid::MissingGuestField("phone").into());
    }
    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
    Ok(GuestContact {
        name: trimmed(contact.name),
        email: trimmed(contact.email),
        phone: trimmed(contact.phone),
        country: contact.country.filter(|c| !c.trim().is_empty()),
    })
}

/// Overlap check for an admin block: other blocks first, then active stays.
pub(crate) fn check_block_free(
    cal: &PropertyCalendar,
    interval: &Interval,
    ignore_block: Option<BlockedRangeId>,
) -> Result<(), EngineError> {
    if cal
        .blocked_overlapping(interval)
        .any(|b| Some(b.id) != ignore_block)
    {
        return Err(EngineError::Conflict(Unavailable::BlockedByOwner));
    }
    if cal.active_overlapping(interval, None).next().is_some() {
        return Err(EngineError::Conflict(Unavailable::AlreadyBooked));
    }
    Ok(())
}

pub(crate) fn stay_nights(interval: &Interval) -> Result<u32, EngineError> {
    u32::try_from(interval.nights()).map_err(|_| EngineError::LimitExceeded("date range too long"))
}

pub(crate) fn stay_price(nights: u32, nightly_rate: Amount) -> Result<Amount, EngineError> {
    nightly_rate
        .checked_mul(u64::from(nights))
        .ok_or(EngineError::LimitExceeded("total price overflows"))
}
