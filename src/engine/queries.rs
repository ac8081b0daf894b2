use std::cmp::Reverse;

use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::availability::{first_block, resolve};
use super::{Engine, EngineError, Entity, Invalid};

/// Calendar windows may be a single day but never run backwards.
fn check_window(window: &Interval) -> Result<(), EngineError> {
    if window.end < window.start {
        return Err(Invalid::EndBeforeStart.into());
    }
    if window.nights() > MAX_CALENDAR_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("calendar window too wide"));
    }
    Ok(())
}

impl Engine {
    // ── Availability ─────────────────────────────────────────

    /// Calendar query: dates and overlaps only, no listing gate.
    pub async fn check_availability(
        &self,
        property_id: PropertyId,
        interval: Interval,
        exclude: Option<ReservationId>,
    ) -> Availability {
        let today = self.today();
        let Some(cal) = self.get_calendar(&property_id) else {
            return resolve(&PropertyCalendar::new(property_id), &interval, exclude, today);
        };
        let guard = cal.read().await;
        resolve(&guard, &interval, exclude, today)
    }

    /// What the booking path would decide: the listing must be a rental in
    /// AVAILABLE status before the calendar is consulted.
    pub async fn check_booking_availability(
        &self,
        property_id: PropertyId,
        interval: Interval,
    ) -> Result<Availability, EngineError> {
        let property = self.load_property(property_id).await?;
        if !property.is_bookable() {
            return Ok(Availability::unavailable(Unavailable::NotRentable));
        }
        Ok(self.check_availability(property_id, interval, None).await)
    }

    /// Held days inside `window` (both ends included).
    pub async fn unavailable_days(
        &self,
        property_id: PropertyId,
        window: Interval,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        check_window(&window)?;
        let Some(cal) = self.get_calendar(&property_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        Ok(super::availability::unavailable_days(&guard, &window))
    }

    // ── Blocked ranges ───────────────────────────────────────

    pub async fn list_blocked_ranges(&self, property_id: PropertyId) -> Vec<BlockedRange> {
        let Some(cal) = self.get_calendar(&property_id) else {
            return Vec::new();
        };
        let guard = cal.read().await;
        guard.blocked.clone()
    }

    pub async fn list_blocked_in_range(
        &self,
        property_id: PropertyId,
        window: Interval,
    ) -> Result<Vec<BlockedRange>, EngineError> {
        check_window(&window)?;
        let Some(cal) = self.get_calendar(&property_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        Ok(guard.blocked_overlapping(&window).cloned().collect())
    }

    pub async fn is_blocked(
        &self,
        property_id: PropertyId,
        window: Interval,
    ) -> Result<BlockCheck, EngineError> {
        check_window(&window)?;
        let Some(cal) = self.get_calendar(&property_id) else {
            return Ok(BlockCheck {
                blocked: false,
                matched_range: None,
            });
        };
        let guard = cal.read().await;
        Ok(first_block(&guard, &window))
    }

    // ── Reservations ─────────────────────────────────────────

    /// Every reservation matching `filter`, newest first.
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        let calendars = match filter.property_id {
            Some(pid) => self.get_calendar(&pid).into_iter().collect(),
            None => self.all_calendars(),
        };
        let mut out = Vec::new();
        for cal in calendars {
            let guard = cal.read().await;
            out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned());
        }
        // ULIDs break ties between reservations created in the same millisecond.
        out.sort_by_key(|r| Reverse((r.created_at, r.id)));
        out
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let not_found = EngineError::NotFound(Entity::Reservation, id);
        let Some(cal) = self.property_for_entity(&id).and_then(|pid| self.get_calendar(&pid)) else {
            return Err(not_found);
        };
        let guard = cal.read().await;
        guard.reservation(id).cloned().ok_or(not_found)
    }

    /// Reservations of one property by check-in date.
    pub async fn list_property_reservations(&self, property_id: PropertyId) -> Vec<Reservation> {
        let Some(cal) = self.get_calendar(&property_id) else {
            return Vec::new();
        };
        let guard = cal.read().await;
        guard.reservations.clone()
    }

    /// Reservations held by a registered user by check-in date.
    pub async fn list_user_reservations(&self, user_id: UserId) -> Vec<Reservation> {
        let mut out = Vec::new();
        for cal in self.all_calendars() {
            let guard = cal.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.user_id() == Some(user_id))
                    .cloned(),
            );
        }
        out.sort_by_key(|r| (r.interval.start, r.id));
        out
    }
}
