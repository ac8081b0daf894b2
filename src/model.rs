use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for record timestamps.
pub type Ms = i64;

/// Money in the listing's smallest currency unit.
pub type Amount = u64;

pub type PropertyId = Ulid;
pub type UserId = Ulid;
pub type ReservationId = Ulid;
pub type BlockedRangeId = Ulid;

/// Calendar-day range `[start, end]`.
///
/// Both endpoints take part in overlap tests: a stay checking in on the day
/// another one checks out collides with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Interval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "Interval start must be before end");
        Self { start, end }
    }

    /// False for ranges that came off the wire with `end <= start`.
    pub fn is_ordered(&self) -> bool {
        self.start < self.end
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Every calendar day from `start` through `end`, both included.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

// ── Consumed records ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingKind {
    Rent,
    Sale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
    Available,
    Pending,
    Rented,
    Sold,
}

/// Listing record as owned by the catalogue; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    /// Price per night.
    pub price: Amount,
    pub listing: ListingKind,
    pub status: PropertyStatus,
}

impl Property {
    pub fn is_rental_listing(&self) -> bool {
        self.listing == ListingKind::Rent
    }

    pub fn is_bookable(&self) -> bool {
        self.is_rental_listing() && self.status == PropertyStatus::Available
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

// ── Occupant identity ────────────────────────────────────────────

/// Contact fields as supplied on a booking request; any may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl ContactDetails {
    /// Fill the gaps from a profile. Values already present win.
    pub fn backfill_from(&mut self, profile: &UserProfile) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.as_deref().is_none_or(str::is_empty) {
                *slot = from.clone();
            }
        }
        fill(&mut self.name, &profile.name);
        fill(&mut self.email, &profile.email);
        fill(&mut self.phone, &profile.phone);
        fill(&mut self.country, &profile.country);
    }
}

/// Contact of an anonymous guest. Name, email and phone are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub country: Option<String>,
}

/// Who the reservation is for: exactly one identity source is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupant {
    Guest(GuestContact),
    Member {
        user_id: UserId,
        contact: ContactDetails,
    },
}

impl Occupant {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Occupant::Guest(_) => None,
            Occupant::Member { user_id, .. } => Some(*user_id),
        }
    }
}

// ── Owned records ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Active reservations hold their dates against competing requests.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub property_id: PropertyId,
    pub occupant: Occupant,
    pub interval: Interval,
    pub nights: u32,
    /// Property price at booking time. Later price edits do not touch it.
    pub nightly_rate: Amount,
    pub total_price: Amount,
    pub status: ReservationStatus,
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.occupant.user_id()
    }
}

/// Admin-defined closure of a property (maintenance, owner stay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedRange {
    pub id: BlockedRangeId,
    pub property_id: PropertyId,
    pub interval: Interval,
    pub reason: Option<String>,
    pub created_at: Ms,
}

// ── Per-property calendar ────────────────────────────────────────

/// Everything the engine owns for one property. Both lists stay sorted by
/// `interval.start`; cancelled reservations are kept for the history.
#[derive(Debug, Clone)]
pub struct PropertyCalendar {
    pub property_id: PropertyId,
    pub blocked: Vec<BlockedRange>,
    pub reservations: Vec<Reservation>,
}

fn insert_by_start<T>(items: &mut Vec<T>, item: T, interval: fn(&T) -> &Interval) {
    let start = interval(&item).start;
    let pos = items.partition_point(|i| interval(i).start <= start);
    items.insert(pos, item);
}

/// Items whose interval overlaps `query` (inclusive bounds).
fn overlapping_in<'a, T>(
    items: &'a [T],
    query: &Interval,
    interval: fn(&T) -> &Interval,
) -> impl Iterator<Item = &'a T> {
    // Everything at index >= right_bound starts after query.end.
    let right_bound = items.partition_point(|i| interval(i).start <= query.end);
    let query = *query;
    items[..right_bound]
        .iter()
        .filter(move |i| interval(i).end >= query.start)
}

impl PropertyCalendar {
    pub fn new(property_id: PropertyId) -> Self {
        Self {
            property_id,
            blocked: Vec::new(),
            reservations: Vec::new(),
        }
    }

    pub fn insert_blocked(&mut self, range: BlockedRange) {
        insert_by_start(&mut self.blocked, range, |b| &b.interval);
    }

    pub fn remove_blocked(&mut self, id: BlockedRangeId) -> Option<BlockedRange> {
        let pos = self.blocked.iter().position(|b| b.id == id)?;
        Some(self.blocked.remove(pos))
    }

    pub fn blocked_range(&self, id: BlockedRangeId) -> Option<&BlockedRange> {
        self.blocked.iter().find(|b| b.id == id)
    }

    pub fn blocked_overlapping(&self, query: &Interval) -> impl Iterator<Item = &BlockedRange> {
        overlapping_in(&self.blocked, query, |b| &b.interval)
    }

    pub fn insert_reservation(&mut self, reservation: Reservation) {
        insert_by_start(&mut self.reservations, reservation, |r| &r.interval);
    }

    pub fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Active reservations overlapping `query`, optionally skipping one id.
    pub fn active_overlapping(
        &self,
        query: &Interval,
        exclude: Option<ReservationId>,
    ) -> impl Iterator<Item = &Reservation> {
        overlapping_in(&self.reservations, query, |r| &r.interval)
            .filter(move |r| r.is_active() && Some(r.id) != exclude)
    }
}

/// Journal record format. One event is one atomic state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RangeBlocked {
        range: BlockedRange,
    },
    RangeUpdated {
        id: BlockedRangeId,
        property_id: PropertyId,
        interval: Interval,
        reason: Option<String>,
    },
    RangeUnblocked {
        id: BlockedRangeId,
        property_id: PropertyId,
    },
    ReservationPlaced {
        reservation: Reservation,
    },
    ReservationStatusSet {
        id: ReservationId,
        property_id: PropertyId,
        status: ReservationStatus,
    },
    /// Cancellation and the release of the blocked ranges inside its window.
    ReservationCancelled {
        id: ReservationId,
        property_id: PropertyId,
        released: Vec<BlockedRangeId>,
    },
    ReservationRescheduled {
        id: ReservationId,
        property_id: PropertyId,
        interval: Interval,
        nights: u32,
        total_price: Amount,
    },
}

impl Event {
    pub fn property_id(&self) -> PropertyId {
        match self {
            Event::RangeBlocked { range } => range.property_id,
            Event::ReservationPlaced { reservation } => reservation.property_id,
            Event::RangeUpdated { property_id, .. }
            | Event::RangeUnblocked { property_id, .. }
            | Event::ReservationStatusSet { property_id, .. }
            | Event::ReservationCancelled { property_id, .. }
            | Event::ReservationRescheduled { property_id, .. } => *property_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Why a date range cannot be booked. Serialized as the user-facing reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unavailable {
    #[serde(rename = "end before start")]
    EndBeforeStart,
    #[serde(rename = "start in past")]
    StartInPast,
    #[serde(rename = "dates already booked")]
    AlreadyBooked,
    #[serde(rename = "dates blocked by owner/admin")]
    BlockedByOwner,
    #[serde(rename = "property not available for rent")]
    NotRentable,
}

impl Unavailable {
    pub fn as_str(self) -> &'static str {
        match self {
            Unavailable::EndBeforeStart => "end before start",
            Unavailable::StartInPast => "start in past",
            Unavailable::AlreadyBooked => "dates already booked",
            Unavailable::BlockedByOwner => "dates blocked by owner/admin",
            Unavailable::NotRentable => "property not available for rent",
        }
    }
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub reason: Option<Unavailable>,
}

impl Availability {
    pub fn free() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(reason: Unavailable) -> Self {
        Self {
            available: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCheck {
    pub blocked: bool,
    pub matched_range: Option<BlockedRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFilter {
    #[serde(default)]
    pub status: Option<ReservationStatus>,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.status.is_none_or(|s| r.status == s)
            && self.property_id.is_none_or(|p| r.property_id == p)
            && self.user_id.is_none_or(|u| r.user_id() == Some(u))
    }
}

/// Partial edit of a blocked range. `reason: Some(None)` clears the reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedRangePatch {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default, with = "double_option")]
    pub reason: Option<Option<String>>,
}

pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Option<String>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            None => s.serialize_none(),
            Some(inner) => inner.serialize(s),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(d).map(Some)
    }
}
