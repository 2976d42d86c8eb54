//! Reporting-week numbering.
//!
//! Weeks are ISO-8601 week numbers (Monday start, week 1 holds the year's
//! first Thursday), so values are always in `1..=53` and the same number is
//! reused every year.

use chrono::{Datelike, NaiveDate, Utc};

pub const FIRST_WEEK: u32 = 1;
pub const LAST_WEEK: u32 = 53;

pub fn week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

pub fn is_valid_week(week: i64) -> bool {
    (FIRST_WEEK as i64..=LAST_WEEK as i64).contains(&week)
}

/// Source of "today" so rollover logic can be driven from tests.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// Wall clock in UTC; every worker of a deployment agrees on the week.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}
