use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::resolve;
use super::conflict::{
    check_block_free, check_bookable, check_contact, check_dates, check_extent, check_reason,
    check_stay_dates, guest_contact, stay_nights, stay_price,
};
use super::{Engine, EngineError, Entity, Invalid};

/// A booking as submitted by the caller. Without a requesting user the
/// contact must identify an anonymous guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub property_id: PropertyId,
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
    pub contact: ContactDetails,
}

impl ReservationRequest {
    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }
}

impl Engine {
    // ── Blocked ranges ───────────────────────────────────────

    pub async fn create_blocked_range(
        &self,
        property_id: PropertyId,
        interval: Interval,
        reason: Option<String>,
    ) -> Result<BlockedRange, EngineError> {
        let today = self.today();
        check_dates(&interval, today)?;
        check_extent(&interval, today, MAX_BLOCK_DAYS)?;
        check_reason(reason.as_deref())?;
        self.load_property(property_id).await?;

        let _gate = self.compaction_gate.read().await;
        let cal = self.calendar_entry(property_id);
        let mut guard = cal.write().await;
        if guard.blocked.len() >= MAX_BLOCKED_RANGES_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many blocked ranges on property"));
        }
        check_block_free(&guard, &interval, None)?;

        let range = BlockedRange {
            id: Ulid::new(),
            property_id,
            interval,
            reason,
            created_at: self.clock.now_ms(),
        };
        self.persist_and_apply(&mut guard, Event::RangeBlocked { range: range.clone() })
            .await?;
        metrics::counter!(crate::observability::BLOCKED_RANGES_CREATED_TOTAL).increment(1);
        Ok(range)
    }

    /// Merge `patch` into a blocked range. The merged dates are held to the
    /// same overlap rules as a new range, ignoring the range itself.
    pub async fn update_blocked_range(
        &self,
        id: BlockedRangeId,
        patch: BlockedRangePatch,
    ) -> Result<BlockedRange, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (property_id, mut guard) = self.resolve_entity_write(Entity::BlockedRange, &id).await?;
        let current = guard
            .blocked_range(id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::BlockedRange, id))?;

        let interval = Interval {
            start: patch.start.unwrap_or(current.interval.start),
            end: patch.end.unwrap_or(current.interval.end),
        };
        let reason = patch.reason.unwrap_or(current.reason);
        if !interval.is_ordered() {
            return Err(Invalid::EndBeforeStart.into());
        }
        if interval != current.interval {
            let today = self.today();
            // A range that already started may keep its start; moving it may not go back.
            if interval.start != current.interval.start && interval.start < today {
                return Err(Invalid::StartInPast.into());
            }
            check_extent(&interval, today, MAX_BLOCK_DAYS)?;
            check_block_free(&guard, &interval, Some(id))?;
        }
        check_reason(reason.as_deref())?;

        let event = Event::RangeUpdated {
            id,
            property_id,
            interval,
            reason: reason.clone(),
        };
        self.persist_and_apply(&mut guard, event).await?;
        Ok(BlockedRange {
            interval,
            reason,
            ..current
        })
    }

    pub async fn delete_blocked_range(&self, id: BlockedRangeId) -> Result<BlockedRange, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (property_id, mut guard) = self.resolve_entity_write(Entity::BlockedRange, &id).await?;
        let range = guard
            .blocked_range(id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::BlockedRange, id))?;
        self.persist_and_apply(&mut guard, Event::RangeUnblocked { id, property_id })
            .await?;
        Ok(range)
    }

    // ── Reservations ─────────────────────────────────────────

    /// Validate, price and persist a booking as PENDING.
    ///
    /// Stateless checks run first. The availability check, the profile
    /// backfill and the journal append then run under the property's write
    /// lock, so of two overlapping requests exactly one gets through.
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
        requesting_user: Option<UserId>,
    ) -> Result<Reservation, EngineError> {
        let started = std::time::Instant::now();
        let interval = request.interval();
        let property_id = request.property_id;
        let today = self.today();

        check_stay_dates(&interval, today)?;
        check_extent(&interval, today, MAX_STAY_NIGHTS)?;

        let mut occupant = match requesting_user {
            None => Occupant::Guest(guest_contact(request.contact)?),
            Some(user_id) => {
                check_contact(&request.contact)?;
                Occupant::Member {
                    user_id,
                    contact: request.contact,
                }
            }
        };

        let property = self.load_property(property_id).await?;
        check_bookable(&property)?;

        let _gate = self.compaction_gate.read().await;
        let cal = self.calendar_entry(property.id);
        let mut guard = cal.write().await;

        let availability = resolve(&guard, &interval, None, today);
        if let Some(reason) = availability.reason {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL, "reason" => reason.as_str())
                .increment(1);
            return Err(EngineError::Conflict(reason));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many reservations on property"));
        }

        let nights = stay_nights(&interval)?;
        let total_price = stay_price(nights, property.price)?;

        if let Occupant::Member { user_id, contact } = &mut occupant {
            let profile = self
                .directory
                .user(*user_id)
                .await?
                .ok_or(EngineError::NotFound(Entity::User, *user_id))?;
            contact.backfill_from(&profile);
        }

        let reservation = Reservation {
            id: Ulid::new(),
            property_id: property.id,
            occupant,
            interval,
            nights,
            nightly_rate: property.price,
            total_price,
            status: ReservationStatus::Pending,
            created_at: self.clock.now_ms(),
        };
        self.persist_and_apply(
            &mut guard,
            Event::ReservationPlaced {
                reservation: reservation.clone(),
            },
        )
        .await?;

        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        metrics::histogram!(crate::observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            "reservation {} placed on {} for {} nights",
            reservation.id, reservation.property_id, nights
        );
        Ok(reservation)
    }

    /// Move an active reservation to new dates. The nightly rate stays the
    /// one captured at booking time.
    pub async fn reschedule_reservation(
        &self,
        id: ReservationId,
        interval: Interval,
    ) -> Result<Reservation, EngineError> {
        let today = self.today();
        check_stay_dates(&interval, today)?;
        check_extent(&interval, today, MAX_STAY_NIGHTS)?;

        let _gate = self.compaction_gate.read().await;
        let (property_id, mut guard) = self.resolve_entity_write(Entity::Reservation, &id).await?;
        let current = guard
            .reservation(id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Reservation, id))?;
        if !current.is_active() {
            return Err(Invalid::ReservationNotActive(current.status).into());
        }
        if interval == current.interval {
            return Ok(current);
        }

        if let Some(reason) = resolve(&guard, &interval, Some(id), today).reason {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL, "reason" => reason.as_str())
                .increment(1);
            return Err(EngineError::Conflict(reason));
        }

        let nights = stay_nights(&interval)?;
        let total_price = stay_price(nights, current.nightly_rate)?;
        let event = Event::ReservationRescheduled {
            id,
            property_id,
            interval,
            nights,
            total_price,
        };
        self.persist_and_apply(&mut guard, event).await?;
        Ok(Reservation {
            interval,
            nights,
            total_price,
            ..current
        })
    }
}
