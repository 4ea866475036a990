//! Authoritative time and calendar derivation.
//!
//! Every component obtains "now" through a [`Clock`] instead of reading the
//! system time directly. The clock renders time in one fixed display
//! timezone and derives day membership from the configured transition hour:
//! the day containing `t` is the local date whose transition boundary is at
//! or before `t` and whose next boundary is after `t`.
//
//  This module is deliberately pure apart from `TimeSource::System`: no IO,
//  no async.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::keys::DayKey;

#[derive(Clone)]
enum TimeSource {
    System,
    Manual(Arc<Mutex<DateTime<Utc>>>),
}

/// Fixed-timezone clock with transition-hour day arithmetic.
///
/// Cloning shares the underlying manual source, so a test can hold a clone
/// and move time while the engine observes the change.
#[derive(Clone)]
pub struct Clock {
    tz: Tz,
    transition_hour: u8,
    source: TimeSource,
}

impl Clock {
    pub fn system(tz: Tz, transition_hour: u8) -> Self {
        Self {
            tz,
            transition_hour: transition_hour % 24,
            source: TimeSource::System,
        }
    }

    /// A clock whose time only moves when told to. Test seam.
    pub fn manual(tz: Tz, transition_hour: u8, start: DateTime<Utc>) -> Self {
        Self {
            tz,
            transition_hour: transition_hour % 24,
            source: TimeSource::Manual(Arc::new(Mutex::new(start))),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn transition_hour(&self) -> u8 {
        self.transition_hour
    }

    pub fn now(&self) -> DateTime<Tz> {
        let utc = match &self.source {
            TimeSource::System => Utc::now(),
            TimeSource::Manual(t) => *t.lock().expect("clock mutex poisoned"),
        };
        utc.with_timezone(&self.tz)
    }

    /// Move a manual clock to an absolute instant. No-op on a system clock.
    pub fn set(&self, to: DateTime<Utc>) {
        if let TimeSource::Manual(t) = &self.source {
            *t.lock().expect("clock mutex poisoned") = to;
        }
    }

    /// Advance a manual clock. No-op on a system clock.
    pub fn advance(&self, by: Duration) {
        if let TimeSource::Manual(t) = &self.source {
            let mut guard = t.lock().expect("clock mutex poisoned");
            *guard += by;
        }
    }

    /// The day containing `t`.
    pub fn day_of(&self, t: DateTime<Tz>) -> DayKey {
        let date = t.date_naive();
        if (t.hour() as u8) >= self.transition_hour {
            DayKey::new(date)
        } else {
            DayKey::new(date.pred_opt().expect("date out of calendar range"))
        }
    }

    pub fn today(&self) -> DayKey {
        self.day_of(self.now())
    }

    /// Local instant at which `day` begins (its transition boundary).
    pub fn day_start(&self, day: DayKey) -> DateTime<Tz> {
        self.local_at(day.date(), self.transition_hour)
    }

    /// Local instant at which `day` ends; equals the next day's start.
    pub fn day_end(&self, day: DayKey) -> DateTime<Tz> {
        self.day_start(day.next())
    }

    /// Start of the slot labelled `hour` within `day`.
    ///
    /// Hour labels are wall-clock hours; labels below the transition hour
    /// fall on the following calendar date.
    pub fn hour_start(&self, day: DayKey, hour: u8) -> DateTime<Tz> {
        let date = if hour >= self.transition_hour {
            day.date()
        } else {
            day.next().date()
        };
        self.local_at(date, hour)
    }

    /// Wall-clock hour label of `t`, 0..=23.
    pub fn hour_label(&self, t: DateTime<Tz>) -> u8 {
        t.hour() as u8
    }

    /// The 24 hour labels of a day grid, in display order starting at the
    /// transition hour.
    pub fn hour_labels(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (self.transition_hour + i as u8) % 24;
        }
        out
    }

    fn local_at(&self, date: NaiveDate, hour: u8) -> DateTime<Tz> {
        // DST gaps can make a local hour nonexistent; fall back to the
        // earliest valid instant after it.
        for h in hour..24 {
            match self
                .tz
                .with_ymd_and_hms(date.year(), date.month(), date.day(), h as u32, 0, 0)
            {
                chrono::LocalResult::Single(t) => return t,
                chrono::LocalResult::Ambiguous(earliest, _) => return earliest,
                chrono::LocalResult::None => continue,
            }
        }
        // A whole local day cannot be skipped.
        unreachable!("no valid local time on {date}")
    }
}
