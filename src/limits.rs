//! Hard limits. Requests that would cross them fail with `LimitExceeded`.

/// Longest bookable stay.
pub const MAX_STAY_NIGHTS: i64 = 366;

/// How far ahead a stay or a blocked range may start.
pub const MAX_BOOKING_HORIZON_DAYS: i64 = 3 * 365;

/// Longest admin block.
pub const MAX_BLOCK_DAYS: i64 = 2 * 365;

/// Widest window accepted by calendar queries.
pub const MAX_CALENDAR_WINDOW_DAYS: i64 = 2 * 366;

pub const MAX_BLOCKED_RANGES_PER_PROPERTY: usize = 10_000;
pub const MAX_RESERVATIONS_PER_PROPERTY: usize = 100_000;

pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_CONTACT_FIELD_LEN: usize = 256;

/// Longest accepted wire command line, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Properties a single connection may listen to at once.
pub const MAX_LISTEN_CHANNELS: usize = 64;
