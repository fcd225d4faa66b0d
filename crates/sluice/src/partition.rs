//! Run-date partition keys.
//!
//! A run resolves its [`PartitionKey`] exactly once and hands the same value
//! to every step of every chain, so a run that straddles midnight still
//! writes one consistent partition.

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use std::fmt;

/// Source of "now" for a run.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in the clock's own time zone.
    fn today(&self) -> NaiveDate;
}

/// Wall clock, local calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date. Used for backfills and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.date.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    fn today(&self) -> NaiveDate {
        self.date
    }
}

/// Calendar components identifying a run's storage partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionKey {
    /// Read the clock once and derive the key.
    pub fn resolve(clock: &dyn Clock) -> Self {
        Self::from_date(clock.today())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }

    /// The key as a calendar date.
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// Renders as `ptn_yyyy=2024/ptn_mm=3/ptn_dd=5` (no zero padding).
impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ptn_yyyy={}/ptn_mm={}/ptn_dd={}",
            self.year, self.month, self.day
        )
    }
}
