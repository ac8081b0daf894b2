use chrono::{NaiveDate, Utc};

use crate::model::Ms;

/// Source of "today" for date validation.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now_ms(&self) -> Ms;
}

/// Wall clock. Calendar days are taken in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn now_ms(&self) -> Ms {
        Utc::now().timestamp_millis()
    }
}

/// Clock pinned to a given day, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn now_ms(&self) -> Ms {
        self.today
            .and_hms_opt(12, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp_millis())
    }
}
